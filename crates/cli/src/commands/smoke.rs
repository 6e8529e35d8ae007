use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::commands::CommandResult;
use parley_agent::{CreateThreadParams, HeuristicProposer, NegotiationRuntime, TurnExecutor};
use parley_core::{
    ApprovalGate, ContractId, MessageRole, OrchestrationError, ResumeAction, SupplierId,
    ThreadId, ThreadStatus,
};
use parley_db::InMemoryThreadStore;

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: &'static str,
    elapsed_ms: u128,
}

/// Drives the whole workflow in-process against the in-memory store: create,
/// direct-commit turn, gated turn, rejected resume, feedback turn, close.
/// No configuration or database is required; failures point at the first
/// broken checkpoint.
pub fn run() -> CommandResult {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "smoke",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let outcome = runtime.block_on(run_checks());

    match outcome {
        Ok(checks) => {
            let detail = serde_json::to_string(&checks).unwrap_or_else(|_| "[]".to_string());
            CommandResult::success("smoke", format!("all workflow checks passed: {detail}"))
        }
        Err((check, message)) => CommandResult::failure(
            "smoke",
            "workflow_check",
            format!("check `{check}` failed: {message}"),
            5,
        ),
    }
}

async fn run_checks() -> Result<Vec<SmokeCheck>, (&'static str, String)> {
    let orchestrator = NegotiationRuntime::new(
        Arc::new(InMemoryThreadStore::new()),
        TurnExecutor::new(Arc::new(HeuristicProposer::new()), Duration::from_secs(5)),
        ApprovalGate::default(),
        Duration::from_millis(50),
    );
    let thread_id = ThreadId("T-SMOKE-0001".to_string());
    let mut checks = Vec::new();

    run_check(&mut checks, "create_thread", || async {
        let snapshot = orchestrator
            .create(CreateThreadParams {
                thread_id: Some(thread_id.clone()),
                contract_id: ContractId("C-SMOKE".to_string()),
                supplier_id: SupplierId("S-SMOKE".to_string()),
                contract_title: Some("Smoke Agreement".to_string()),
                risk_score: Some(0.5),
            })
            .await
            .map_err(|error| error.to_string())?;
        expect(snapshot.status == ThreadStatus::Active, "new thread should be active")
    })
    .await?;

    run_check(&mut checks, "direct_commit_turn", || async {
        let snapshot = orchestrator
            .negotiate(&thread_id, MessageRole::Buyer, "Offer $100k")
            .await
            .map_err(|error| error.to_string())?;
        expect(
            snapshot.status == ThreadStatus::Active && snapshot.messages.len() == 2,
            "low-risk turn should commit input and reply",
        )
    })
    .await?;

    run_check(&mut checks, "gated_turn_pauses", || async {
        let snapshot = orchestrator
            .negotiate(&thread_id, MessageRole::Buyer, "Accept a 40% discount")
            .await
            .map_err(|error| error.to_string())?;
        expect(
            snapshot.status == ThreadStatus::Paused && snapshot.current_context.is_some(),
            "document-impacting turn should pause for review",
        )
    })
    .await?;

    run_check(&mut checks, "paused_thread_refuses_turns", || async {
        match orchestrator.negotiate(&thread_id, MessageRole::Buyer, "more").await {
            Err(OrchestrationError::ThreadPaused(_)) => Ok(()),
            Err(other) => Err(format!("unexpected error: {other}")),
            Ok(_) => Err("paused thread accepted a turn".to_string()),
        }
    })
    .await?;

    run_check(&mut checks, "rejected_resume_returns_active", || async {
        let snapshot = orchestrator
            .resume(&thread_id, ResumeAction::Rejected, Some("too aggressive".to_string()))
            .await
            .map_err(|error| error.to_string())?;
        expect(
            snapshot.status == ThreadStatus::Active && snapshot.current_context.is_none(),
            "rejection should clear the pending context",
        )
    })
    .await?;

    run_check(&mut checks, "close_thread", || async {
        let snapshot = orchestrator.close(&thread_id).await.map_err(|error| error.to_string())?;
        expect(snapshot.status == ThreadStatus::Completed, "close should complete the thread")
    })
    .await?;

    Ok(checks)
}

async fn run_check<F, Fut>(
    checks: &mut Vec<SmokeCheck>,
    name: &'static str,
    check: F,
) -> Result<(), (&'static str, String)>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<(), String>>,
{
    let started = Instant::now();
    match check().await {
        Ok(()) => {
            checks.push(SmokeCheck {
                name,
                status: "ok",
                elapsed_ms: started.elapsed().as_millis(),
            });
            Ok(())
        }
        Err(message) => Err((name, message)),
    }
}

fn expect(condition: bool, message: &str) -> Result<(), String> {
    if condition {
        Ok(())
    } else {
        Err(message.to_string())
    }
}
