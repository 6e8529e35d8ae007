use crate::domain::decision::Candidate;

pub const DEFAULT_RISK_THRESHOLD: f64 = 0.65;

#[derive(Clone, Debug, PartialEq)]
pub enum GateDecision {
    CommitDirectly,
    RequireApproval { reason_code: &'static str },
}

impl GateDecision {
    pub fn requires_approval(&self) -> bool {
        matches!(self, Self::RequireApproval { .. })
    }
}

/// The single human-in-the-loop boundary. Every candidate, from every turn
/// source (buyer input, simulated counterparty turns alike), passes through
/// `evaluate` before anything is committed to a thread.
///
/// Policy: a candidate that modifies the document (carries a redline) or
/// whose self-reported risk exceeds the threshold requires human sign-off;
/// purely conversational responses commit directly.
#[derive(Clone, Debug)]
pub struct ApprovalGate {
    risk_threshold: f64,
}

impl Default for ApprovalGate {
    fn default() -> Self {
        Self { risk_threshold: DEFAULT_RISK_THRESHOLD }
    }
}

impl ApprovalGate {
    pub fn new(risk_threshold: f64) -> Self {
        Self { risk_threshold }
    }

    pub fn risk_threshold(&self) -> f64 {
        self.risk_threshold
    }

    pub fn evaluate(&self, candidate: &Candidate) -> GateDecision {
        if candidate.context.redline.is_some() {
            return GateDecision::RequireApproval { reason_code: "redline_present" };
        }

        if candidate.risk > self.risk_threshold {
            return GateDecision::RequireApproval { reason_code: "risk_threshold_exceeded" };
        }

        GateDecision::CommitDirectly
    }
}
