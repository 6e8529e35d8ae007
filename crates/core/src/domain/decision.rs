use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit back-reference for one evaluation cycle. Opaque; allocated by the
/// turn executor, never used for mutation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(pub String);

impl std::fmt::Display for TurnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The approval-facing view of a candidate action: what the human sees when
/// deciding whether to let the agent proceed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionContext {
    pub strategy: String,
    pub reasoning: String,
    pub redline: Option<String>,
    pub turn_id: TurnId,
}

/// A candidate action produced by the turn executor, before the approval
/// gate has seen it.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub message: String,
    pub context: DecisionContext,
    pub risk: f64,
    pub terminal: bool,
}

/// The stored form of a candidate awaiting human sign-off. Keeps the
/// committed-on-approval message alongside the decision context so a resume
/// can append exactly what the gate held back.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingDecision {
    pub context: DecisionContext,
    pub message: String,
    pub risk: f64,
    pub terminal: bool,
    pub requested_at: DateTime<Utc>,
}

impl PendingDecision {
    pub fn from_candidate(candidate: Candidate, requested_at: DateTime<Utc>) -> Self {
        Self {
            context: candidate.context,
            message: candidate.message,
            risk: candidate.risk,
            terminal: candidate.terminal,
            requested_at,
        }
    }
}

/// Human verdict on a pending decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResumeAction {
    Approved,
    Rejected,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{Candidate, DecisionContext, PendingDecision, TurnId};

    #[test]
    fn pending_decision_preserves_candidate_message() {
        let candidate = Candidate {
            message: "Proposed counter: cap liability at 12 months of fees.".to_string(),
            context: DecisionContext {
                strategy: "COUNTER".to_string(),
                reasoning: "Unlimited liability exceeds policy.".to_string(),
                redline: Some("Liability is capped at 12 months of fees.".to_string()),
                turn_id: TurnId("t-1".to_string()),
            },
            risk: 0.8,
            terminal: false,
        };

        let decision = PendingDecision::from_candidate(candidate.clone(), Utc::now());

        assert_eq!(decision.message, candidate.message);
        assert_eq!(decision.context, candidate.context);
        assert!(!decision.terminal);
    }
}
