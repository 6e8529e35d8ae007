use async_trait::async_trait;
use thiserror::Error;

use parley_core::Thread;

/// What the reasoning capability returns for one turn: a strategy label, a
/// justification, an optional document redline, the reply to commit, a
/// self-reported risk in 0.0..=1.0, and whether approving the action
/// finalizes the contract.
#[derive(Clone, Debug, PartialEq)]
pub struct Proposal {
    pub strategy: String,
    pub reasoning: String,
    pub redline: Option<String>,
    pub message: String,
    pub risk: f64,
    pub terminal: bool,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProposerError {
    #[error("reasoning capability unavailable: {0}")]
    Unavailable(String),
    #[error("reasoning capability declined to act: {0}")]
    Declined(String),
}

/// The opaque reasoning capability behind the turn executor. Implementations
/// must not touch thread state; they see the conversation and return a
/// proposal, nothing more.
#[async_trait]
pub trait Proposer: Send + Sync {
    async fn propose(
        &self,
        thread: &Thread,
        input: &str,
        prior_feedback: Option<&str>,
    ) -> Result<Proposal, ProposerError>;
}

const HIGH_SUPPLIER_RISK: f64 = 0.7;
const DISCOUNT_COUNTER_FLOOR: u8 = 25;
const CAPPED_DISCOUNT_PCT: u8 = 15;

const DOCUMENT_IMPACT_TERMS: &[&str] = &[
    "liability",
    "indemn",
    "warranty",
    "termination",
    "penalty",
    "exclusiv",
    "auto-renew",
    "payment terms",
];

const ACCEPTANCE_PHRASES: &[&str] =
    &["we accept", "we agree", "terms are acceptable", "finalize the agreement", "sign the contract"];

/// Deterministic stand-in for an LLM-backed negotiator. Decides a stance
/// from the clause text and the supplier's risk profile, drafts a protective
/// redline for document-impacting clauses, and composes the reply.
#[derive(Clone, Debug, Default)]
pub struct HeuristicProposer;

impl HeuristicProposer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Proposer for HeuristicProposer {
    async fn propose(
        &self,
        thread: &Thread,
        input: &str,
        prior_feedback: Option<&str>,
    ) -> Result<Proposal, ProposerError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ProposerError::Declined("no actionable input was provided".to_string()));
        }

        let normalized = trimmed.to_ascii_lowercase();
        let high_risk_supplier = thread.risk_score > HIGH_SUPPLIER_RISK;

        if ACCEPTANCE_PHRASES.iter().any(|phrase| normalized.contains(phrase)) {
            return Ok(accept_proposal(trimmed, prior_feedback));
        }

        if let Some(pct) = extract_discount_pct(&normalized) {
            if pct >= DISCOUNT_COUNTER_FLOOR {
                return Ok(discount_counter_proposal(pct, high_risk_supplier, prior_feedback));
            }
        }

        if let Some(term) = DOCUMENT_IMPACT_TERMS.iter().find(|term| normalized.contains(**term)) {
            return Ok(clause_counter_proposal(trimmed, term, high_risk_supplier, prior_feedback));
        }

        Ok(conversational_proposal(trimmed, high_risk_supplier, prior_feedback))
    }
}

fn accept_proposal(input: &str, prior_feedback: Option<&str>) -> Proposal {
    let reasoning = with_feedback(
        format!("The counterparty signalled acceptance (\"{input}\"). Finalizing closes the negotiation."),
        prior_feedback,
    );
    Proposal {
        strategy: "ACCEPT".to_string(),
        reasoning,
        redline: None,
        message: "We confirm acceptance of the agreed terms and will proceed to finalize the contract.".to_string(),
        // Finalization is always a human decision.
        risk: 0.9,
        terminal: true,
    }
}

fn discount_counter_proposal(pct: u8, high_risk_supplier: bool, prior_feedback: Option<&str>) -> Proposal {
    let reasoning = with_feedback(
        format!(
            "A {pct}% discount exceeds the negotiation limit of {DISCOUNT_COUNTER_FLOOR}%. Countering with the capped rate{}.",
            if high_risk_supplier { " and a protective stance given the supplier's risk profile" } else { "" }
        ),
        prior_feedback,
    );
    let redline = format!(
        "Any discount shall not exceed {CAPPED_DISCOUNT_PCT}% of the list price for the initial term."
    );
    let message = format!(
        "Proposed redline (COUNTER):\n{redline}\n\nReasoning: {reasoning}"
    );
    Proposal {
        strategy: "COUNTER".to_string(),
        reasoning,
        redline: Some(redline),
        message,
        risk: if high_risk_supplier { 0.9 } else { 0.8 },
        terminal: false,
    }
}

fn clause_counter_proposal(
    input: &str,
    term: &str,
    high_risk_supplier: bool,
    prior_feedback: Option<&str>,
) -> Proposal {
    let reasoning = with_feedback(
        format!(
            "The clause touches `{term}`, a document-impacting area{}.",
            if high_risk_supplier {
                ", and the supplier's elevated risk profile warrants protective language"
            } else {
                ""
            }
        ),
        prior_feedback,
    );
    let redline = format!(
        "The clause \"{input}\" is revised to limit exposure: obligations in this area are capped at the fees paid in the preceding twelve months."
    );
    let message = format!("Proposed redline (COUNTER):\n{redline}\n\nReasoning: {reasoning}");
    Proposal {
        strategy: "COUNTER".to_string(),
        reasoning,
        redline: Some(redline),
        message,
        risk: if high_risk_supplier { 0.85 } else { 0.75 },
        terminal: false,
    }
}

fn conversational_proposal(
    input: &str,
    high_risk_supplier: bool,
    prior_feedback: Option<&str>,
) -> Proposal {
    let reasoning = with_feedback(
        "Conversational exchange with no document impact; continuing the dialogue.".to_string(),
        prior_feedback,
    );
    let message = if high_risk_supplier {
        format!(
            "Noted: \"{input}\". Given our diligence findings we would like supporting detail before moving on commercial terms."
        )
    } else {
        format!("Noted: \"{input}\". We are open to discussing this further; could you share your expectations on timeline?")
    };
    Proposal {
        strategy: "CLARIFY".to_string(),
        reasoning,
        redline: None,
        message,
        risk: if high_risk_supplier { 0.35 } else { 0.15 },
        terminal: false,
    }
}

fn with_feedback(reasoning: String, prior_feedback: Option<&str>) -> String {
    match prior_feedback {
        Some(feedback) if !feedback.trim().is_empty() => {
            format!("{reasoning} Adjusted per reviewer feedback: {feedback}.")
        }
        _ => reasoning,
    }
}

pub(crate) fn extract_discount_pct(normalized: &str) -> Option<u8> {
    if !normalized.contains("discount") && !normalized.contains("rebate") {
        return None;
    }

    let bytes = normalized.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index].is_ascii_digit() {
            let start = index;
            while index < bytes.len() && bytes[index].is_ascii_digit() {
                index += 1;
            }
            let digits = &normalized[start..index];
            let rest = normalized[index..].trim_start();
            if rest.starts_with('%') || rest.starts_with("percent") || rest.starts_with("pct") {
                if let Ok(pct) = digits.parse::<u8>() {
                    return Some(pct.min(100));
                }
            }
        } else {
            index += 1;
        }
    }

    None
}
