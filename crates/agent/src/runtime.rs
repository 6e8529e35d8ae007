use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};
use uuid::Uuid;

use parley_core::{
    ApprovalGate, ContractId, DomainError, GateDecision, Message, MessageRole, NegotiationFlow,
    OrchestrationError, PendingDecision, ResumeAction, SupplierId, Thread, ThreadId,
    ThreadSnapshot, ThreadStatus, ThreadStore, WorkflowEngine, WorkflowEvent,
};

use crate::executor::{ExecutorError, TurnExecutor};

#[derive(Clone, Debug)]
pub struct CreateThreadParams {
    pub thread_id: Option<ThreadId>,
    pub contract_id: ContractId,
    pub supplier_id: SupplierId,
    pub contract_title: Option<String>,
    pub risk_score: Option<f64>,
}

/// The workflow state machine's owner and the sole writer of thread state.
///
/// Operations on the same thread are serialized by a lazily-grown lock
/// table: entries are never removed, so a lock handed out once stays valid
/// for the thread's lifetime. tokio's mutex is FIFO-fair, which makes turn
/// processing follow request-arrival order.
///
/// Every mutation is prepared on an owned copy of the aggregate and
/// persisted with a single compare-and-swap store write; a failed executor
/// call therefore persists nothing.
pub struct NegotiationRuntime {
    store: Arc<dyn ThreadStore>,
    executor: TurnExecutor,
    gate: ApprovalGate,
    engine: WorkflowEngine<NegotiationFlow>,
    snapshot_wait: Duration,
    locks: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl NegotiationRuntime {
    pub fn new(
        store: Arc<dyn ThreadStore>,
        executor: TurnExecutor,
        gate: ApprovalGate,
        snapshot_wait: Duration,
    ) -> Self {
        Self {
            store,
            executor,
            gate,
            engine: WorkflowEngine::default(),
            snapshot_wait,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, thread_id: &ThreadId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(thread_id.0.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    async fn load(&self, thread_id: &ThreadId) -> Result<Thread, OrchestrationError> {
        self.store
            .find_by_id(thread_id)
            .await?
            .ok_or_else(|| OrchestrationError::ThreadNotFound(thread_id.clone()))
    }

    pub async fn create(
        &self,
        params: CreateThreadParams,
    ) -> Result<ThreadSnapshot, OrchestrationError> {
        let thread_id =
            params.thread_id.unwrap_or_else(|| ThreadId(Uuid::new_v4().to_string()));
        let title = params
            .contract_title
            .unwrap_or_else(|| format!("Contract {}", params.contract_id.0));
        let thread = Thread::new(
            thread_id.clone(),
            params.contract_id,
            params.supplier_id,
            title,
            params.risk_score.unwrap_or(0.0),
            Utc::now(),
        );

        self.store.create(thread.clone()).await?;
        info!(
            event_name = "workflow.thread_created",
            thread_id = %thread_id,
            "negotiation thread created"
        );
        Ok(thread.snapshot())
    }

    /// Accepts one inbound turn, runs it through the executor and the
    /// approval gate, and commits the outcome. Fails fast with a conflict
    /// while a decision is pending: that refusal is the backpressure that
    /// keeps approvals from racing.
    pub async fn negotiate(
        &self,
        thread_id: &ThreadId,
        actor: MessageRole,
        text: &str,
    ) -> Result<ThreadSnapshot, OrchestrationError> {
        let lock = self.lock_for(thread_id);
        let _guard = lock.lock().await;

        let mut thread = self.load(thread_id).await?;
        match thread.status {
            ThreadStatus::Paused => return Err(OrchestrationError::ThreadPaused(thread_id.clone())),
            ThreadStatus::Completed => {
                return Err(OrchestrationError::ThreadCompleted(thread_id.clone()));
            }
            ThreadStatus::Active => {}
        }

        let expected_version = thread.version;
        let now = Utc::now();
        thread.append_message(Message::new(actor, text, None, now));
        let prior_feedback = thread.take_feedback();

        let candidate =
            match self.executor.execute(&thread, text, prior_feedback.as_deref()).await {
                Ok(candidate) => candidate,
                Err(ExecutorError::Unavailable(message)) => {
                    // Nothing has been persisted: the thread keeps its prior
                    // state and the caller may retry.
                    warn!(
                        event_name = "workflow.executor_unavailable",
                        thread_id = %thread_id,
                        error = %message,
                        "turn abandoned; thread state unchanged"
                    );
                    return Err(OrchestrationError::ExecutorUnavailable(message));
                }
                Err(ExecutorError::Rejected(reason)) => {
                    // No-op turn: commit the inbound message plus an
                    // explanatory note and keep the thread active.
                    self.engine
                        .apply(thread.status, &WorkflowEvent::TurnCommitted)
                        .map_err(DomainError::from)?;
                    thread.append_message(Message::new(
                        MessageRole::Buyer,
                        format!("No action was taken on this turn: {reason}"),
                        None,
                        now,
                    ));
                    info!(
                        event_name = "workflow.turn_declined",
                        thread_id = %thread_id,
                        reason = %reason,
                        "executor declined; committed as a no-op turn"
                    );
                    thread.prepare_commit(now);
                    self.store.update(thread.clone(), expected_version).await?;
                    return Ok(thread.snapshot());
                }
            };

        let turn_id = candidate.context.turn_id.clone();
        match self.gate.evaluate(&candidate) {
            GateDecision::CommitDirectly => {
                self.engine
                    .apply(thread.status, &WorkflowEvent::TurnCommitted)
                    .map_err(DomainError::from)?;
                thread.append_message(Message::new(
                    MessageRole::Buyer,
                    candidate.message,
                    Some(turn_id.clone()),
                    now,
                ));
                info!(
                    event_name = "workflow.turn_committed",
                    thread_id = %thread_id,
                    turn_id = %turn_id,
                    "candidate committed without review"
                );
            }
            GateDecision::RequireApproval { reason_code } => {
                self.engine
                    .apply(thread.status, &WorkflowEvent::ReviewRequired)
                    .map_err(DomainError::from)?;
                thread.pause_for_review(PendingDecision::from_candidate(candidate, now))?;
                info!(
                    event_name = "workflow.review_required",
                    thread_id = %thread_id,
                    turn_id = %turn_id,
                    reason_code,
                    "candidate parked for human approval"
                );
            }
        }

        thread.prepare_commit(now);
        self.store.update(thread.clone(), expected_version).await?;
        Ok(thread.snapshot())
    }

    /// Applies a human decision to the parked candidate, exactly once. The
    /// pending decision is cleared on every path out of here.
    pub async fn resume(
        &self,
        thread_id: &ThreadId,
        action: ResumeAction,
        feedback: Option<String>,
    ) -> Result<ThreadSnapshot, OrchestrationError> {
        let lock = self.lock_for(thread_id);
        let _guard = lock.lock().await;

        let mut thread = self.load(thread_id).await?;
        if thread.status != ThreadStatus::Paused {
            return Err(OrchestrationError::NotPaused(thread_id.clone()));
        }
        if thread.current_decision.is_none() {
            return Err(OrchestrationError::NoPendingContext(thread_id.clone()));
        }

        let expected_version = thread.version;
        let now = Utc::now();
        let decision = thread.take_decision()?;

        match action {
            ResumeAction::Approved => {
                let event = WorkflowEvent::ResumeApproved { terminal: decision.terminal };
                let outcome =
                    self.engine.apply(thread.status, &event).map_err(DomainError::from)?;
                thread.transition_to(outcome.to)?;
                thread.append_message(Message::new(
                    MessageRole::Buyer,
                    decision.message.clone(),
                    Some(decision.context.turn_id.clone()),
                    now,
                ));
                info!(
                    event_name = "workflow.resume_approved",
                    thread_id = %thread_id,
                    turn_id = %decision.context.turn_id,
                    terminal = decision.terminal,
                    "approved candidate committed"
                );
            }
            ResumeAction::Rejected => {
                let outcome = self
                    .engine
                    .apply(thread.status, &WorkflowEvent::ResumeRejected)
                    .map_err(DomainError::from)?;
                thread.transition_to(outcome.to)?;
                thread.pending_feedback = feedback.filter(|text| !text.trim().is_empty());
                info!(
                    event_name = "workflow.resume_rejected",
                    thread_id = %thread_id,
                    turn_id = %decision.context.turn_id,
                    has_feedback = thread.pending_feedback.is_some(),
                    "candidate discarded; feedback parked for the next turn"
                );
            }
        }

        thread.prepare_commit(now);
        self.store.update(thread.clone(), expected_version).await?;
        Ok(thread.snapshot())
    }

    /// Read path for polling clients. Waits briefly for any in-flight turn
    /// so the common case observes the freshest commit, then falls back to
    /// the last-committed state rather than blocking.
    pub async fn snapshot(
        &self,
        thread_id: &ThreadId,
    ) -> Result<ThreadSnapshot, OrchestrationError> {
        let lock = self.lock_for(thread_id);
        let guard = tokio::time::timeout(self.snapshot_wait, lock.lock()).await.ok();
        let thread = self.load(thread_id).await?;
        drop(guard);
        Ok(thread.snapshot())
    }

    pub async fn list(&self) -> Result<Vec<ThreadSnapshot>, OrchestrationError> {
        let threads = self.store.list().await?;
        Ok(threads.iter().map(Thread::snapshot).collect())
    }

    /// Explicit close. A parked decision is discarded as part of the
    /// transition; the thread ends in `completed` either way.
    pub async fn close(&self, thread_id: &ThreadId) -> Result<ThreadSnapshot, OrchestrationError> {
        let lock = self.lock_for(thread_id);
        let _guard = lock.lock().await;

        let mut thread = self.load(thread_id).await?;
        if thread.status == ThreadStatus::Completed {
            return Err(OrchestrationError::ThreadCompleted(thread_id.clone()));
        }

        let expected_version = thread.version;
        let now = Utc::now();
        let discarded = if thread.status == ThreadStatus::Paused {
            Some(thread.take_decision()?)
        } else {
            None
        };

        let outcome = self
            .engine
            .apply(thread.status, &WorkflowEvent::CloseRequested)
            .map_err(DomainError::from)?;
        thread.transition_to(outcome.to)?;

        info!(
            event_name = "workflow.thread_closed",
            thread_id = %thread_id,
            discarded_decision = discarded.is_some(),
            "thread closed"
        );

        thread.prepare_commit(now);
        self.store.update(thread.clone(), expected_version).await?;
        Ok(thread.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;

    use parley_core::{
        ApprovalGate, ContractId, MessageRole, OrchestrationError, ResumeAction, SupplierId,
        Thread, ThreadId, ThreadStatus,
    };
    use parley_db::InMemoryThreadStore;

    use crate::executor::TurnExecutor;
    use crate::proposer::{Proposal, Proposer, ProposerError};

    use super::{CreateThreadParams, NegotiationRuntime};

    fn low_risk(message: &str) -> Proposal {
        Proposal {
            strategy: "CLARIFY".to_string(),
            reasoning: "conversational".to_string(),
            redline: None,
            message: message.to_string(),
            risk: 0.1,
            terminal: false,
        }
    }

    fn review_required(message: &str) -> Proposal {
        Proposal {
            strategy: "COUNTER".to_string(),
            reasoning: "document impact".to_string(),
            redline: Some("Revised clause text.".to_string()),
            message: message.to_string(),
            risk: 0.9,
            terminal: false,
        }
    }

    fn terminal_accept(message: &str) -> Proposal {
        Proposal {
            strategy: "ACCEPT".to_string(),
            reasoning: "counterparty accepted".to_string(),
            redline: None,
            message: message.to_string(),
            risk: 0.9,
            terminal: true,
        }
    }

    /// Scripted capability: pops pre-loaded results, records the feedback it
    /// was handed, and optionally sleeps to simulate a slow provider.
    #[derive(Default)]
    struct ScriptedProposer {
        results: Mutex<VecDeque<Result<Proposal, ProposerError>>>,
        seen_feedback: Mutex<Vec<Option<String>>>,
        delay: Option<Duration>,
    }

    impl ScriptedProposer {
        fn with_results(results: Vec<Result<Proposal, ProposerError>>) -> Arc<Self> {
            Arc::new(Self { results: Mutex::new(results.into()), ..Self::default() })
        }

        fn echoing_with_delay(delay: Duration) -> Arc<Self> {
            Arc::new(Self { delay: Some(delay), ..Self::default() })
        }

        fn feedback_seen(&self) -> Vec<Option<String>> {
            self.seen_feedback.lock().expect("feedback lock").clone()
        }
    }

    #[async_trait]
    impl Proposer for ScriptedProposer {
        async fn propose(
            &self,
            _thread: &Thread,
            input: &str,
            prior_feedback: Option<&str>,
        ) -> Result<Proposal, ProposerError> {
            self.seen_feedback
                .lock()
                .expect("feedback lock")
                .push(prior_feedback.map(str::to_string));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let scripted = self.results.lock().expect("results lock").pop_front();
            scripted.unwrap_or_else(|| Ok(low_risk(&format!("re: {input}"))))
        }
    }

    fn runtime_with(proposer: Arc<ScriptedProposer>) -> Arc<NegotiationRuntime> {
        Arc::new(NegotiationRuntime::new(
            Arc::new(InMemoryThreadStore::new()),
            TurnExecutor::new(proposer, Duration::from_secs(5)),
            ApprovalGate::default(),
            Duration::from_millis(50),
        ))
    }

    fn params(id: &str) -> CreateThreadParams {
        CreateThreadParams {
            thread_id: Some(ThreadId(id.to_string())),
            contract_id: ContractId("C-1".to_string()),
            supplier_id: SupplierId("S-1".to_string()),
            contract_title: Some("Master Services Agreement".to_string()),
            risk_score: Some(0.85),
        }
    }

    fn id(value: &str) -> ThreadId {
        ThreadId(value.to_string())
    }

    #[tokio::test]
    async fn create_starts_active_with_empty_history() {
        let runtime = runtime_with(ScriptedProposer::with_results(vec![]));
        let snapshot = runtime.create(params("T-1")).await.expect("create");

        assert_eq!(snapshot.status, ThreadStatus::Active);
        assert!(snapshot.messages.is_empty());
        assert!(snapshot.current_context.is_none());
        assert_eq!(snapshot.contract_title, "Master Services Agreement");
    }

    #[tokio::test]
    async fn direct_commit_appends_input_and_attributed_reply() {
        let runtime =
            runtime_with(ScriptedProposer::with_results(vec![Ok(low_risk("Happy to discuss."))]));
        runtime.create(params("T-1")).await.expect("create");

        let snapshot = runtime
            .negotiate(&id("T-1"), MessageRole::Buyer, "Offer $100k")
            .await
            .expect("negotiate");

        assert_eq!(snapshot.status, ThreadStatus::Active);
        assert!(snapshot.current_context.is_none());
        assert_eq!(snapshot.messages.len(), 2);
        assert_eq!(snapshot.messages[0].content, "Offer $100k");
        assert_eq!(snapshot.messages[0].role, MessageRole::Buyer);
        assert!(snapshot.messages[0].source_turn_id.is_none());
        assert_eq!(snapshot.messages[1].content, "Happy to discuss.");
        assert!(snapshot.messages[1].source_turn_id.is_some(), "reply must be turn-attributed");
    }

    #[tokio::test]
    async fn review_path_pauses_and_rejects_new_turns() {
        let runtime = runtime_with(ScriptedProposer::with_results(vec![Ok(review_required(
            "Proposed counter with redline.",
        ))]));
        runtime.create(params("T-1")).await.expect("create");

        let snapshot = runtime
            .negotiate(&id("T-1"), MessageRole::Buyer, "Accept a 40% discount")
            .await
            .expect("negotiate");

        assert_eq!(snapshot.status, ThreadStatus::Paused);
        let context = snapshot.current_context.expect("context must be set while paused");
        assert!(context.redline.is_some());
        // Only the inbound message is visible; the candidate is parked.
        assert_eq!(snapshot.messages.len(), 1);

        let error = runtime
            .negotiate(&id("T-1"), MessageRole::Buyer, "And free support")
            .await
            .expect_err("paused thread must refuse new turns");
        assert!(matches!(error, OrchestrationError::ThreadPaused(_)));
    }

    #[tokio::test]
    async fn approve_commits_exactly_the_candidate_message() {
        let runtime = runtime_with(ScriptedProposer::with_results(vec![Ok(review_required(
            "We can offer 15% on a 24-month term.",
        ))]));
        runtime.create(params("T-1")).await.expect("create");
        runtime
            .negotiate(&id("T-1"), MessageRole::Buyer, "Accept a 40% discount")
            .await
            .expect("negotiate");

        let snapshot = runtime
            .resume(&id("T-1"), ResumeAction::Approved, None)
            .await
            .expect("resume approved");

        assert_eq!(snapshot.status, ThreadStatus::Active);
        assert!(snapshot.current_context.is_none(), "context cleared on resume");
        assert_eq!(snapshot.messages.len(), 2);
        assert_eq!(snapshot.messages[1].content, "We can offer 15% on a 24-month term.");
        assert!(snapshot.messages[1].source_turn_id.is_some());
    }

    #[tokio::test]
    async fn terminal_approval_completes_the_thread() {
        let runtime = runtime_with(ScriptedProposer::with_results(vec![Ok(terminal_accept(
            "Confirming final acceptance.",
        ))]));
        runtime.create(params("T-1")).await.expect("create");
        runtime
            .negotiate(&id("T-1"), MessageRole::Supplier, "We accept your revised terms")
            .await
            .expect("negotiate");

        let snapshot = runtime
            .resume(&id("T-1"), ResumeAction::Approved, None)
            .await
            .expect("resume approved");

        assert_eq!(snapshot.status, ThreadStatus::Completed);
        assert!(snapshot.current_context.is_none());

        let error = runtime
            .negotiate(&id("T-1"), MessageRole::Buyer, "One more thing")
            .await
            .expect_err("completed thread accepts no turns");
        assert!(matches!(error, OrchestrationError::ThreadCompleted(_)));
    }

    #[tokio::test]
    async fn reject_appends_nothing_and_forwards_feedback() {
        let proposer = ScriptedProposer::with_results(vec![
            Ok(review_required("Aggressive counter.")),
            Ok(low_risk("Softer reply.")),
        ]);
        let runtime = runtime_with(proposer.clone());
        runtime.create(params("T-1")).await.expect("create");
        runtime
            .negotiate(&id("T-1"), MessageRole::Buyer, "Accept a 40% discount")
            .await
            .expect("negotiate");

        let snapshot = runtime
            .resume(&id("T-1"), ResumeAction::Rejected, Some("too aggressive".to_string()))
            .await
            .expect("resume rejected");

        assert_eq!(snapshot.status, ThreadStatus::Active);
        assert!(snapshot.current_context.is_none());
        assert_eq!(snapshot.messages.len(), 1, "rejection appends zero messages");

        runtime
            .negotiate(&id("T-1"), MessageRole::Buyer, "Try again, gentler")
            .await
            .expect("follow-up negotiate");

        let feedback = proposer.feedback_seen();
        assert_eq!(feedback.len(), 2);
        assert_eq!(feedback[0], None);
        assert_eq!(feedback[1].as_deref(), Some("too aggressive"));
    }

    #[tokio::test]
    async fn feedback_is_consumed_by_exactly_one_turn() {
        let proposer = ScriptedProposer::with_results(vec![
            Ok(review_required("Counter.")),
            Ok(low_risk("First retry.")),
            Ok(low_risk("Second retry.")),
        ]);
        let runtime = runtime_with(proposer.clone());
        runtime.create(params("T-1")).await.expect("create");
        runtime
            .negotiate(&id("T-1"), MessageRole::Buyer, "Accept a 40% discount")
            .await
            .expect("negotiate");
        runtime
            .resume(&id("T-1"), ResumeAction::Rejected, Some("too aggressive".to_string()))
            .await
            .expect("reject");

        runtime.negotiate(&id("T-1"), MessageRole::Buyer, "again").await.expect("first retry");
        runtime.negotiate(&id("T-1"), MessageRole::Buyer, "again").await.expect("second retry");

        let feedback = proposer.feedback_seen();
        assert_eq!(feedback[1].as_deref(), Some("too aggressive"));
        assert_eq!(feedback[2], None, "feedback must not leak into later turns");
    }

    #[tokio::test]
    async fn resume_without_pause_is_a_conflict() {
        let runtime = runtime_with(ScriptedProposer::with_results(vec![]));
        runtime.create(params("T-1")).await.expect("create");

        let error = runtime
            .resume(&id("T-1"), ResumeAction::Approved, None)
            .await
            .expect_err("active thread cannot resume");
        assert!(matches!(error, OrchestrationError::NotPaused(_)));
    }

    #[tokio::test]
    async fn duplicate_resume_observes_not_paused() {
        let runtime = runtime_with(ScriptedProposer::with_results(vec![Ok(review_required(
            "Counter.",
        ))]));
        runtime.create(params("T-1")).await.expect("create");
        runtime
            .negotiate(&id("T-1"), MessageRole::Buyer, "Accept a 40% discount")
            .await
            .expect("negotiate");
        runtime.resume(&id("T-1"), ResumeAction::Approved, None).await.expect("first resume");

        let error = runtime
            .resume(&id("T-1"), ResumeAction::Approved, None)
            .await
            .expect_err("second resume is a no-op failure, not a double-commit");
        assert!(matches!(error, OrchestrationError::NotPaused(_)));
    }

    #[tokio::test]
    async fn unknown_thread_is_not_found() {
        let runtime = runtime_with(ScriptedProposer::with_results(vec![]));
        let error = runtime
            .negotiate(&id("missing"), MessageRole::Buyer, "hello")
            .await
            .expect_err("unknown thread");
        assert!(matches!(error, OrchestrationError::ThreadNotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn executor_timeout_leaves_the_thread_untouched() {
        let proposer = ScriptedProposer::echoing_with_delay(Duration::from_secs(60));
        let runtime = Arc::new(NegotiationRuntime::new(
            Arc::new(InMemoryThreadStore::new()),
            TurnExecutor::new(proposer, Duration::from_millis(100)),
            ApprovalGate::default(),
            Duration::from_millis(50),
        ));
        runtime.create(params("T-1")).await.expect("create");

        let error = runtime
            .negotiate(&id("T-1"), MessageRole::Buyer, "Offer $100k")
            .await
            .expect_err("deadline should fire");
        assert!(matches!(error, OrchestrationError::ExecutorUnavailable(_)));

        let snapshot = runtime.snapshot(&id("T-1")).await.expect("snapshot");
        assert_eq!(snapshot.status, ThreadStatus::Active);
        assert!(snapshot.messages.is_empty(), "no partial transition may persist");
    }

    #[tokio::test]
    async fn executor_decline_commits_a_noop_turn() {
        let runtime = runtime_with(ScriptedProposer::with_results(vec![Err(
            ProposerError::Declined("clause is out of scope".to_string()),
        )]));
        runtime.create(params("T-1")).await.expect("create");

        let snapshot = runtime
            .negotiate(&id("T-1"), MessageRole::Buyer, "Handle this")
            .await
            .expect("declined turn still commits");

        assert_eq!(snapshot.status, ThreadStatus::Active);
        assert!(snapshot.current_context.is_none());
        assert_eq!(snapshot.messages.len(), 2);
        assert!(snapshot.messages[1].content.contains("clause is out of scope"));
    }

    #[tokio::test]
    async fn simulated_supplier_turns_pass_the_same_gate() {
        let runtime = runtime_with(ScriptedProposer::with_results(vec![Ok(review_required(
            "Counter to the supplier's demand.",
        ))]));
        runtime.create(params("T-1")).await.expect("create");

        let snapshot = runtime
            .negotiate(&id("T-1"), MessageRole::Supplier, "We require a 40% discount")
            .await
            .expect("supplier turn");

        assert_eq!(snapshot.status, ThreadStatus::Paused, "gate applies to simulated turns too");
        assert_eq!(snapshot.messages[0].role, MessageRole::Supplier);
    }

    #[tokio::test]
    async fn concurrent_negotiations_serialize_without_interleaving() {
        let runtime = runtime_with(ScriptedProposer::with_results(vec![]));
        runtime.create(params("T-1")).await.expect("create");

        let mut handles = Vec::new();
        for index in 0..4 {
            let runtime = runtime.clone();
            handles.push(tokio::spawn(async move {
                runtime
                    .negotiate(&ThreadId("T-1".to_string()), MessageRole::Buyer, &format!("turn {index}"))
                    .await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("negotiate");
        }

        let snapshot = runtime.snapshot(&id("T-1")).await.expect("snapshot");
        assert_eq!(snapshot.status, ThreadStatus::Active);
        assert!(snapshot.current_context.is_none());
        assert_eq!(snapshot.messages.len(), 8, "four serialized turns, two messages each");

        // Serialization means each inbound message is immediately followed
        // by its attributed reply; no interleaving across turns.
        for pair in snapshot.messages.chunks(2) {
            assert!(pair[0].source_turn_id.is_none());
            let reply_turn = pair[1].source_turn_id.as_ref().expect("attributed reply");
            assert_eq!(pair[1].content, format!("re: {}", pair[0].content));
            assert!(!reply_turn.0.is_empty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_returns_last_committed_state_during_a_turn() {
        let proposer = ScriptedProposer::echoing_with_delay(Duration::from_secs(2));
        let runtime = Arc::new(NegotiationRuntime::new(
            Arc::new(InMemoryThreadStore::new()),
            TurnExecutor::new(proposer, Duration::from_secs(10)),
            ApprovalGate::default(),
            Duration::from_millis(50),
        ));
        runtime.create(params("T-1")).await.expect("create");

        let background = runtime.clone();
        let in_flight = tokio::spawn(async move {
            background.negotiate(&ThreadId("T-1".to_string()), MessageRole::Buyer, "slow turn").await
        });
        tokio::task::yield_now().await;

        let snapshot = runtime.snapshot(&id("T-1")).await.expect("snapshot must not block");
        assert!(snapshot.messages.is_empty(), "mid-turn reads observe the last commit");

        let committed = in_flight.await.expect("join").expect("negotiate");
        assert_eq!(committed.messages.len(), 2);
    }

    #[tokio::test]
    async fn close_discards_pending_decision_and_completes() {
        let runtime = runtime_with(ScriptedProposer::with_results(vec![Ok(review_required(
            "Counter.",
        ))]));
        runtime.create(params("T-1")).await.expect("create");
        runtime
            .negotiate(&id("T-1"), MessageRole::Buyer, "Accept a 40% discount")
            .await
            .expect("negotiate");

        let snapshot = runtime.close(&id("T-1")).await.expect("close");
        assert_eq!(snapshot.status, ThreadStatus::Completed);
        assert!(snapshot.current_context.is_none());

        let error = runtime.close(&id("T-1")).await.expect_err("closing twice is a conflict");
        assert!(matches!(error, OrchestrationError::ThreadCompleted(_)));
    }

    #[tokio::test]
    async fn list_returns_snapshots_for_all_threads() {
        let runtime = runtime_with(ScriptedProposer::with_results(vec![]));
        runtime.create(params("T-1")).await.expect("create first");
        runtime.create(params("T-2")).await.expect("create second");

        let snapshots = runtime.list().await.expect("list");
        assert_eq!(snapshots.len(), 2);
    }
}
