use std::sync::Arc;
use std::time::Duration;

use parley_agent::{
    HeuristicProposer, NegotiationRuntime, PersonaLibrary, SimulationError, SupplierSimulator,
    TurnExecutor,
};
use parley_core::config::{AppConfig, ConfigError, LoadOptions};
use parley_core::ApprovalGate;
use parley_db::{connect_with_settings, migrations, DbPool, SqlThreadStore};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<NegotiationRuntime>,
    pub personas: Arc<PersonaLibrary>,
    pub simulator: SupplierSimulator,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("persona library failed to load: {0}")]
    Personas(#[from] SimulationError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let personas = match &config.simulation.personas_dir {
        Some(dir) => PersonaLibrary::load_dir(dir)?,
        None => PersonaLibrary::builtin(),
    };
    info!(
        event_name = "system.bootstrap.personas_loaded",
        correlation_id = "bootstrap",
        persona_count = personas.ids().len(),
        "supplier personas loaded"
    );

    let executor = TurnExecutor::new(
        Arc::new(HeuristicProposer::new()),
        Duration::from_secs(config.llm.timeout_secs),
    );
    let runtime = Arc::new(NegotiationRuntime::new(
        Arc::new(SqlThreadStore::new(db_pool.clone())),
        executor,
        ApprovalGate::new(config.gate.risk_threshold),
        Duration::from_millis(config.server.snapshot_wait_ms),
    ));

    Ok(Application {
        config,
        db_pool,
        runtime,
        personas: Arc::new(personas),
        simulator: SupplierSimulator::new(),
    })
}
