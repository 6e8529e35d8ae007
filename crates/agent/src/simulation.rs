use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use parley_core::MessageRole;

use crate::proposer::extract_discount_pct;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NegotiationStyle {
    Aggressive,
    Collaborative,
    Passive,
}

/// A counterparty profile: who they are, what they want, and where they
/// will not move. Loaded from TOML files, one persona per file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SupplierPersona {
    pub id: String,
    pub name: String,
    pub style: NegotiationStyle,
    pub goals: Vec<String>,
    pub constraints: Vec<String>,
    #[serde(default = "default_tone")]
    pub negotiation_tone: String,
}

fn default_tone() -> String {
    "professional".to_string()
}

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("persona `{0}` was not found")]
    PersonaNotFound(String),
    #[error("could not load persona file `{path}`: {message}")]
    PersonaLoad { path: PathBuf, message: String },
}

/// One prior exchange, as supplied by the caller. The simulator never reads
/// thread state directly; the conversation arrives through this boundary.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct HistoryEntry {
    pub sender: MessageRole,
    pub content: String,
}

pub struct PersonaLibrary {
    personas: HashMap<String, SupplierPersona>,
}

impl PersonaLibrary {
    /// The built-in persona keeps the simulator usable with zero setup.
    pub fn builtin() -> Self {
        let default = SupplierPersona {
            id: "default".to_string(),
            name: "Meridian Software".to_string(),
            style: NegotiationStyle::Collaborative,
            goals: vec![
                "Close a multi-year commitment".to_string(),
                "Protect list-price integrity".to_string(),
            ],
            constraints: vec![
                "No unlimited liability".to_string(),
                "No exclusivity commitments".to_string(),
            ],
            negotiation_tone: default_tone(),
        };

        let mut personas = HashMap::new();
        personas.insert(default.id.clone(), default);
        Self { personas }
    }

    /// Extends the built-ins with every `*.toml` persona in `dir`. Files
    /// override built-ins on id collision.
    pub fn load_dir(dir: &Path) -> Result<Self, SimulationError> {
        let mut library = Self::builtin();

        let entries = fs::read_dir(dir).map_err(|error| SimulationError::PersonaLoad {
            path: dir.to_path_buf(),
            message: error.to_string(),
        })?;

        for entry in entries {
            let entry = entry.map_err(|error| SimulationError::PersonaLoad {
                path: dir.to_path_buf(),
                message: error.to_string(),
            })?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
                continue;
            }

            let raw = fs::read_to_string(&path).map_err(|error| SimulationError::PersonaLoad {
                path: path.clone(),
                message: error.to_string(),
            })?;
            let persona: SupplierPersona =
                toml::from_str(&raw).map_err(|error| SimulationError::PersonaLoad {
                    path: path.clone(),
                    message: error.to_string(),
                })?;
            library.personas.insert(persona.id.clone(), persona);
        }

        Ok(library)
    }

    pub fn get(&self, persona_id: &str) -> Result<&SupplierPersona, SimulationError> {
        self.personas
            .get(persona_id)
            .ok_or_else(|| SimulationError::PersonaNotFound(persona_id.to_string()))
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.personas.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

const CLOSING_PRESSURE_TURNS: usize = 8;

const HARD_LINE_TERMS: &[&str] = &["unlimited liability", "penalt", "exclusiv"];

/// Synthesizes the counterparty's next reply. Pure function of persona,
/// history, and the latest proposal; never touches thread state. The caller
/// feeds the result back through `negotiate` as a supplier turn.
#[derive(Clone, Debug, Default)]
pub struct SupplierSimulator;

impl SupplierSimulator {
    pub fn new() -> Self {
        Self
    }

    pub fn reply(
        &self,
        persona: &SupplierPersona,
        history: &[HistoryEntry],
        latest_proposal: &str,
    ) -> String {
        let normalized = latest_proposal.trim().to_ascii_lowercase();
        let opener = match persona.style {
            NegotiationStyle::Aggressive => "Let's be direct.",
            NegotiationStyle::Collaborative => "Thanks for the proposal.",
            NegotiationStyle::Passive => "We appreciate you walking us through this.",
        };

        if let Some(term) = HARD_LINE_TERMS.iter().find(|term| normalized.contains(**term)) {
            let constraint = persona
                .constraints
                .first()
                .map(String::as_str)
                .unwrap_or("our standing commercial policy");
            return format!(
                "{opener} {} cannot agree to terms touching `{term}`; that crosses a line for us: {constraint}. Please revise that point and we will keep working on the rest.",
                persona.name
            );
        }

        if let Some(pct) = extract_discount_pct(&normalized) {
            let cap = match persona.style {
                NegotiationStyle::Aggressive => 10,
                NegotiationStyle::Collaborative => 20,
                NegotiationStyle::Passive => 30,
            };
            if u32::from(pct) <= cap {
                return format!(
                    "{opener} A {pct}% discount works for {} provided it supports our goal: {}. Consider it agreed on our side.",
                    persona.name,
                    persona.goals.first().map(String::as_str).unwrap_or("a durable partnership")
                );
            }
            return format!(
                "{opener} {pct}% is beyond what {} can sustain; we can go as far as {cap}% on a committed term. Can you work with that?",
                persona.name
            );
        }

        if history.len() >= CLOSING_PRESSURE_TURNS {
            return format!(
                "{opener} We have covered the ground we needed to. {} is prepared to finalize at the last discussed terms if you are.",
                persona.name
            );
        }

        format!(
            "{opener} {} is open to this direction. Our priority remains: {}. What timeline do you have in mind?",
            persona.name,
            persona.goals.first().map(String::as_str).unwrap_or("a durable partnership")
        )
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use parley_core::MessageRole;

    use super::{
        HistoryEntry, NegotiationStyle, PersonaLibrary, SimulationError, SupplierSimulator,
    };

    fn history(len: usize) -> Vec<HistoryEntry> {
        (0..len)
            .map(|index| HistoryEntry {
                sender: if index % 2 == 0 { MessageRole::Buyer } else { MessageRole::Supplier },
                content: format!("exchange {index}"),
            })
            .collect()
    }

    #[test]
    fn builtin_library_always_has_a_default_persona() {
        let library = PersonaLibrary::builtin();
        let persona = library.get("default").expect("default persona");
        assert_eq!(persona.style, NegotiationStyle::Collaborative);
    }

    #[test]
    fn unknown_persona_is_reported_by_id() {
        let library = PersonaLibrary::builtin();
        let error = library.get("ghost-corp").expect_err("unknown persona");
        assert!(matches!(error, SimulationError::PersonaNotFound(ref id) if id == "ghost-corp"));
    }

    #[test]
    fn personas_load_from_toml_files() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(
            dir.path().join("techflow.toml"),
            r#"
id = "techflow-saas"
name = "TechFlow SaaS"
style = "aggressive"
goals = ["Maximize contract value"]
constraints = ["No payment terms beyond net-30"]
"#,
        )
        .expect("write persona");

        let library = PersonaLibrary::load_dir(dir.path()).expect("load dir");
        let persona = library.get("techflow-saas").expect("loaded persona");
        assert_eq!(persona.name, "TechFlow SaaS");
        assert_eq!(persona.style, NegotiationStyle::Aggressive);
        assert_eq!(persona.negotiation_tone, "professional", "tone defaults when omitted");
        // Built-ins survive alongside loaded personas.
        assert!(library.get("default").is_ok());
    }

    #[test]
    fn replies_are_deterministic_for_identical_inputs() {
        let library = PersonaLibrary::builtin();
        let persona = library.get("default").expect("persona");
        let simulator = SupplierSimulator::new();

        let first = simulator.reply(persona, &history(2), "Offer $100k for year one");
        let second = simulator.reply(persona, &history(2), "Offer $100k for year one");
        assert_eq!(first, second);
    }

    #[test]
    fn discount_tolerance_depends_on_style() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(
            dir.path().join("hardline.toml"),
            r#"
id = "hardline"
name = "Hardline Inc"
style = "aggressive"
goals = ["Protect margin"]
constraints = []
"#,
        )
        .expect("write persona");
        let library = PersonaLibrary::load_dir(dir.path()).expect("load dir");
        let simulator = SupplierSimulator::new();

        let aggressive = library.get("hardline").expect("persona");
        let collaborative = library.get("default").expect("persona");

        let refusal = simulator.reply(aggressive, &[], "We ask for a 15% discount");
        let agreement = simulator.reply(collaborative, &[], "We ask for a 15% discount");

        assert!(refusal.contains("as far as 10%"));
        assert!(agreement.contains("works for"));
    }

    #[test]
    fn hard_line_terms_draw_a_firm_refusal() {
        let library = PersonaLibrary::builtin();
        let persona = library.get("default").expect("persona");
        let reply =
            SupplierSimulator::new().reply(persona, &[], "We need unlimited liability coverage");
        assert!(reply.contains("cannot agree"));
        assert!(reply.contains(&persona.constraints[0]));
    }

    #[test]
    fn long_conversations_push_toward_closing() {
        let library = PersonaLibrary::builtin();
        let persona = library.get("default").expect("persona");
        let reply = SupplierSimulator::new().reply(persona, &history(9), "Anything else to cover?");
        assert!(reply.contains("finalize"));
    }
}
