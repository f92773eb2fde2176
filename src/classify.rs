//! Simulation outcome classification
//!
//! A failed dry run is sorted into one of three kinds by an ordered table of
//! case-insensitive substring markers:
//!
//! 1. a successful outcome is never classified, whatever its logs say
//! 2. log lines are scanned against the table; the first rule (in table
//!    order) that matches any line wins
//! 3. with no log lines, the structured error value is stringified and
//!    scanned against the same table
//! 4. anything unmatched is `Fatal`
//!
//! The built-in table lists explicit defect markers first, then transient
//! network conditions, then precondition markers. Operators extend it
//! through [`ClassifierConfig`](crate::config::ClassifierConfig); extra
//! markers join the end of their kind's group.

use crate::config::ClassifierConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of one dry run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimulationOutcome {
    pub succeeded: bool,
    pub log_lines: Vec<String>,
    pub raw_error: Option<serde_json::Value>,
    pub units_consumed: Option<u64>,
}

impl SimulationOutcome {
    pub fn success(log_lines: Vec<String>) -> Self {
        Self {
            succeeded: true,
            log_lines,
            ..Self::default()
        }
    }

    pub fn failure(log_lines: Vec<String>, raw_error: Option<serde_json::Value>) -> Self {
        Self {
            succeeded: false,
            log_lines,
            raw_error,
            units_consumed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The call is well-formed; required on-chain state is missing or already there
    Precondition,
    /// Encoding, account-list or business-logic defect
    Fatal,
    /// Network condition; the same call may succeed on a fresh cycle
    Transient,
}

impl ErrorKind {
    fn group_order(self) -> u8 {
        match self {
            ErrorKind::Fatal => 0,
            ErrorKind::Transient => 1,
            ErrorKind::Precondition => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Precondition => "precondition",
            ErrorKind::Fatal => "fatal",
            ErrorKind::Transient => "transient",
        }
    }
}

/// A classified failure with the text it was derived from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorClassification {
    pub kind: ErrorKind,
    /// The table marker that matched, `None` for unmatched fatal outcomes
    pub marker: Option<String>,
    /// The log line or stringified error the decision was made on
    pub excerpt: String,
}

impl ErrorClassification {
    pub fn is_precondition(&self) -> bool {
        self.kind == ErrorKind::Precondition
    }

    pub fn is_fatal(&self) -> bool {
        self.kind == ErrorKind::Fatal
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Transient
    }
}

impl fmt::Display for ErrorClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.marker {
            Some(marker) => write!(f, "{} [{}]: {}", self.kind.as_str(), marker, self.excerpt),
            None => write!(f, "{}: {}", self.kind.as_str(), self.excerpt),
        }
    }
}

/// One `(pattern, kind)` entry of the classification table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerRule {
    pub pattern: String,
    pub kind: ErrorKind,
}

impl MarkerRule {
    pub fn new(pattern: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            pattern: pattern.into(),
            kind,
        }
    }
}

/// Built-in marker table, in match priority order
pub const DEFAULT_RULES: &[(&str, ErrorKind)] = &[
    // Payload or account-list defects; these win over anything else in the logs
    ("InstructionFallbackNotFound", ErrorKind::Fatal),
    ("InstructionDidNotDeserialize", ErrorKind::Fatal),
    ("InstructionDidNotSerialize", ErrorKind::Fatal),
    ("AccountDiscriminatorMismatch", ErrorKind::Fatal),
    ("NotEnoughAccountKeys", ErrorKind::Fatal),
    // Network conditions
    ("BlockhashNotFound", ErrorKind::Transient),
    ("Blockhash not found", ErrorKind::Transient),
    ("Node is behind", ErrorKind::Transient),
    ("Too many requests", ErrorKind::Transient),
    ("AccountInUse", ErrorKind::Transient),
    // Missing or already-satisfied on-chain state
    ("already in use", ErrorKind::Precondition),
    ("AccountNotInitialized", ErrorKind::Precondition),
    ("not initialized", ErrorKind::Precondition),
    ("already initialized", ErrorKind::Precondition),
    ("insufficient", ErrorKind::Precondition),
    ("ConstraintSeeds", ErrorKind::Precondition),
    ("ConstraintOwner", ErrorKind::Precondition),
    ("AccountOwnedByWrongProgram", ErrorKind::Precondition),
    ("already active", ErrorKind::Precondition),
    ("already exists", ErrorKind::Precondition),
];

/// Ordered, data-driven classifier
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<MarkerRule>,
    // lowercased copies of `rules[i].pattern`
    needles: Vec<String>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(
            DEFAULT_RULES
                .iter()
                .map(|(pattern, kind)| MarkerRule::new(*pattern, *kind))
                .collect(),
        )
    }
}

impl Classifier {
    /// Use `rules` exactly as given
    pub fn new(rules: Vec<MarkerRule>) -> Self {
        let needles = rules.iter().map(|r| r.pattern.to_lowercase()).collect();
        Self { rules, needles }
    }

    /// Built-in table plus operator-supplied markers
    pub fn from_config(config: &ClassifierConfig) -> Self {
        let mut rules: Vec<MarkerRule> = DEFAULT_RULES
            .iter()
            .map(|(pattern, kind)| MarkerRule::new(*pattern, *kind))
            .collect();

        let extras = [
            (&config.fatal_markers, ErrorKind::Fatal),
            (&config.transient_markers, ErrorKind::Transient),
            (&config.precondition_markers, ErrorKind::Precondition),
        ];
        for (markers, kind) in extras {
            rules.extend(
                markers
                    .iter()
                    .filter(|m| !m.trim().is_empty())
                    .map(|m| MarkerRule::new(m.trim(), kind)),
            );
        }

        // stable: keeps table order inside each group
        rules.sort_by_key(|r| r.kind.group_order());
        Self::new(rules)
    }

    pub fn rules(&self) -> &[MarkerRule] {
        &self.rules
    }

    /// `None` when the simulation succeeded
    pub fn classify(&self, outcome: &SimulationOutcome) -> Option<ErrorClassification> {
        if outcome.succeeded {
            return None;
        }

        if !outcome.log_lines.is_empty() {
            if let Some(found) = self.scan(&outcome.log_lines) {
                return Some(found);
            }
            return Some(ErrorClassification {
                kind: ErrorKind::Fatal,
                marker: None,
                excerpt: fatal_excerpt(&outcome.log_lines),
            });
        }

        if let Some(raw) = &outcome.raw_error {
            let text = match raw {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let lines = [text];
            if let Some(found) = self.scan(&lines) {
                return Some(found);
            }
            let [text] = lines;
            return Some(ErrorClassification {
                kind: ErrorKind::Fatal,
                marker: None,
                excerpt: text,
            });
        }

        Some(ErrorClassification {
            kind: ErrorKind::Fatal,
            marker: None,
            excerpt: "simulation failed without log lines or error value".to_string(),
        })
    }

    fn scan(&self, lines: &[String]) -> Option<ErrorClassification> {
        let lowered: Vec<String> = lines.iter().map(|l| l.to_lowercase()).collect();
        for (rule, needle) in self.rules.iter().zip(&self.needles) {
            if let Some(idx) = lowered.iter().position(|l| l.contains(needle.as_str())) {
                return Some(ErrorClassification {
                    kind: rule.kind,
                    marker: Some(rule.pattern.clone()),
                    excerpt: lines[idx].clone(),
                });
            }
        }
        None
    }
}

// The last line that looks like an error report, else the last line.
fn fatal_excerpt(lines: &[String]) -> String {
    lines
        .iter()
        .rev()
        .find(|l| {
            let l = l.to_lowercase();
            l.contains("error") || l.contains("failed")
        })
        .or_else(|| lines.last())
        .cloned()
        .unwrap_or_default()
}
