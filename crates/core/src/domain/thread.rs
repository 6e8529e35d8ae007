use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::decision::{DecisionContext, PendingDecision, TurnId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SupplierId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    Active,
    Paused,
    Completed,
}

/// Which side of the table a message came from. Presentation-layer aliases
/// ("user"/"agent") are the client's concern, not part of this model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    Buyer,
    Supplier,
}

/// Immutable once appended. Agent-committed replies carry the turn id that
/// produced them; raw inbound text carries none.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub source_turn_id: Option<TurnId>,
}

impl Message {
    pub fn new(
        role: MessageRole,
        content: impl Into<String>,
        source_turn_id: Option<TurnId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self { role, content: content.into(), created_at, source_turn_id }
    }
}

/// One negotiation's persistent state. Owned exclusively by the workflow
/// runtime; every mutation is committed as a single versioned store write.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub version: i64,
    pub status: ThreadStatus,
    pub contract_id: ContractId,
    pub supplier_id: SupplierId,
    pub contract_title: String,
    pub risk_score: f64,
    pub messages: Vec<Message>,
    pub current_decision: Option<PendingDecision>,
    pub pending_feedback: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    pub fn new(
        id: ThreadId,
        contract_id: ContractId,
        supplier_id: SupplierId,
        contract_title: impl Into<String>,
        risk_score: f64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            version: 1,
            status: ThreadStatus::Active,
            contract_id,
            supplier_id,
            contract_title: contract_title.into(),
            risk_score,
            messages: Vec::new(),
            current_decision: None,
            pending_feedback: None,
            created_at,
            updated_at: created_at,
        }
    }

    pub fn can_transition_to(&self, next: ThreadStatus) -> bool {
        matches!(
            (self.status, next),
            (ThreadStatus::Active, ThreadStatus::Paused)
                | (ThreadStatus::Paused, ThreadStatus::Active)
                | (ThreadStatus::Active, ThreadStatus::Completed)
                | (ThreadStatus::Paused, ThreadStatus::Completed)
        )
    }

    pub fn transition_to(&mut self, next: ThreadStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidThreadTransition { from: self.status, to: next })
    }

    pub fn append_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Parks a candidate for human review and pauses the thread. The pending
    /// decision exists iff the thread is paused; this is the only way in.
    pub fn pause_for_review(&mut self, decision: PendingDecision) -> Result<(), DomainError> {
        if self.current_decision.is_some() {
            return Err(DomainError::InvariantViolation(format!(
                "thread `{}` already holds a pending decision",
                self.id
            )));
        }
        self.transition_to(ThreadStatus::Paused)?;
        self.current_decision = Some(decision);
        Ok(())
    }

    /// Consumes the pending decision exactly once. The caller owns the
    /// follow-up transition (back to active, or completed for terminal
    /// approvals).
    pub fn take_decision(&mut self) -> Result<PendingDecision, DomainError> {
        if self.status != ThreadStatus::Paused {
            return Err(DomainError::InvariantViolation(format!(
                "thread `{}` is not paused; nothing to decide",
                self.id
            )));
        }
        self.current_decision.take().ok_or_else(|| {
            DomainError::InvariantViolation(format!(
                "thread `{}` is paused without a pending decision",
                self.id
            ))
        })
    }

    /// Takes the feedback left by a rejected resume, if any. Consumed by the
    /// next turn executor invocation.
    pub fn take_feedback(&mut self) -> Option<String> {
        self.pending_feedback.take()
    }

    /// Stamps the aggregate for a commit: bumps the optimistic-concurrency
    /// version and the update time. Called once per committed mutation.
    pub fn prepare_commit(&mut self, at: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = at;
    }

    /// `current_decision` is `Some` iff the thread is paused.
    pub fn decision_invariant_holds(&self) -> bool {
        (self.status == ThreadStatus::Paused) == self.current_decision.is_some()
    }

    pub fn snapshot(&self) -> ThreadSnapshot {
        ThreadSnapshot {
            id: self.id.clone(),
            status: self.status,
            contract_title: self.contract_title.clone(),
            risk_score: self.risk_score,
            messages: self.messages.clone(),
            current_context: self.current_decision.as_ref().map(|d| d.context.clone()),
            last_update: self.updated_at,
        }
    }
}

/// The consistent, committed view served to polling clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThreadSnapshot {
    pub id: ThreadId,
    pub status: ThreadStatus,
    pub contract_title: String,
    pub risk_score: f64,
    pub messages: Vec<Message>,
    pub current_context: Option<DecisionContext>,
    pub last_update: DateTime<Utc>,
}
