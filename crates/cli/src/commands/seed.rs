use std::sync::Arc;
use std::time::Duration;

use crate::commands::CommandResult;
use parley_agent::{CreateThreadParams, HeuristicProposer, NegotiationRuntime, TurnExecutor};
use parley_core::config::{AppConfig, LoadOptions};
use parley_core::{ApprovalGate, ContractId, MessageRole, StoreError, SupplierId, ThreadId};
use parley_db::{connect_with_settings, migrations, SqlThreadStore};

const DEMO_THREAD_ID: &str = "T-DEMO-0001";

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let orchestrator = NegotiationRuntime::new(
            Arc::new(SqlThreadStore::new(pool.clone())),
            TurnExecutor::new(
                Arc::new(HeuristicProposer::new()),
                Duration::from_secs(config.llm.timeout_secs),
            ),
            ApprovalGate::new(config.gate.risk_threshold),
            Duration::from_millis(config.server.snapshot_wait_ms),
        );

        let created = orchestrator
            .create(CreateThreadParams {
                thread_id: Some(ThreadId(DEMO_THREAD_ID.to_string())),
                contract_id: ContractId("C-DEMO-0001".to_string()),
                supplier_id: SupplierId("S-DEMO-0001".to_string()),
                contract_title: Some("Demo Cloud Services Agreement".to_string()),
                risk_score: Some(0.85),
            })
            .await;

        match created {
            Ok(_) => {}
            Err(parley_core::OrchestrationError::Store(StoreError::AlreadyExists(_))) => {
                pool.close().await;
                return Ok("demo thread already seeded; nothing to do".to_string());
            }
            Err(error) => return Err(("seed_execution", error.to_string(), 5u8)),
        }

        // One committed exchange so the demo thread opens with history.
        orchestrator
            .negotiate(
                &ThreadId(DEMO_THREAD_ID.to_string()),
                MessageRole::Buyer,
                "Opening position: $100k annual commitment at list price.",
            )
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        pool.close().await;
        Ok(format!("seeded demo thread `{DEMO_THREAD_ID}` with an opening exchange"))
    });

    match result {
        Ok(message) => CommandResult::success("seed", message),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}
