//! Proposals: opaque, non-executable suggestions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Maximum length of a proposal's text body.
pub const MAX_PROPOSAL_TEXT_LENGTH: usize = 64 * 1024;

/// Maximum number of assumptions, unknowns, or symbolic actions.
pub const MAX_PROPOSAL_ITEMS: usize = 256;

/// A symbolic action: a name and arguments with no binding to any real
/// capability. Executing one is not a concept this type supports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SymbolicAction {
    /// Action name, meaningful only to whoever reads the proposal.
    pub name: String,
    /// Opaque arguments.
    #[serde(default)]
    pub arguments: std::collections::BTreeMap<String, Value>,
}

/// Errors in proposal construction.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ProposalError {
    /// The text body is empty or exceeds bounds.
    #[error("proposal text must be 1..={MAX_PROPOSAL_TEXT_LENGTH} bytes, got {length}")]
    TextOutOfBounds {
        /// Observed length.
        length: usize,
    },

    /// A list field exceeds bounds.
    #[error("proposal field '{field}' exceeds {MAX_PROPOSAL_ITEMS} items: {length}")]
    TooManyItems {
        /// The oversized field.
        field: &'static str,
        /// Observed length.
        length: usize,
    },

    /// The confidence range is not an ordered pair inside `[0, 1]`.
    #[error("confidence range must satisfy 0 <= low <= high <= 1, got ({low}, {high})")]
    InvalidConfidenceRange {
        /// Lower bound supplied.
        low: f64,
        /// Upper bound supplied.
        high: f64,
    },
}

/// An opaque suggestion from sandboxed reasoning code.
///
/// Proposals state their own uncertainty: a confidence *range* rather than
/// a number, explicit assumptions, and explicit known unknowns. Nothing
/// downstream is obliged to read any of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Proposal {
    /// Unique identifier (`PRP-<uuid>`).
    pub proposal_id: String,
    /// The suggestion itself, as text.
    pub text: String,
    /// Assumptions the suggestion rests on.
    #[serde(default)]
    pub assumptions: Vec<String>,
    /// Self-assessed confidence interval, `(low, high)` within `[0, 1]`.
    pub confidence_range: (f64, f64),
    /// What the proposer knows it does not know.
    #[serde(default)]
    pub known_unknowns: Vec<String>,
    /// Symbolic actions the proposer imagines; none is executable.
    #[serde(default)]
    pub symbolic_actions: Vec<SymbolicAction>,
}

impl Proposal {
    /// Create a proposal with a fresh id.
    ///
    /// # Errors
    ///
    /// Returns [`ProposalError`] when bounds are violated.
    pub fn new(
        text: impl Into<String>,
        confidence_range: (f64, f64),
    ) -> Result<Self, ProposalError> {
        let text = text.into();
        if text.is_empty() || text.len() > MAX_PROPOSAL_TEXT_LENGTH {
            return Err(ProposalError::TextOutOfBounds { length: text.len() });
        }
        let (low, high) = confidence_range;
        if !(low.is_finite() && high.is_finite() && 0.0 <= low && low <= high && high <= 1.0) {
            return Err(ProposalError::InvalidConfidenceRange { low, high });
        }
        Ok(Self {
            proposal_id: format!("PRP-{}", uuid::Uuid::new_v4()),
            text,
            assumptions: Vec::new(),
            confidence_range,
            known_unknowns: Vec::new(),
            symbolic_actions: Vec::new(),
        })
    }

    /// Record an assumption.
    ///
    /// # Errors
    ///
    /// Returns [`ProposalError::TooManyItems`] past the bound.
    pub fn with_assumption(mut self, assumption: impl Into<String>) -> Result<Self, ProposalError> {
        if self.assumptions.len() >= MAX_PROPOSAL_ITEMS {
            return Err(ProposalError::TooManyItems {
                field: "assumptions",
                length: self.assumptions.len() + 1,
            });
        }
        self.assumptions.push(assumption.into());
        Ok(self)
    }

    /// Record a known unknown.
    ///
    /// # Errors
    ///
    /// Returns [`ProposalError::TooManyItems`] past the bound.
    pub fn with_known_unknown(mut self, unknown: impl Into<String>) -> Result<Self, ProposalError> {
        if self.known_unknowns.len() >= MAX_PROPOSAL_ITEMS {
            return Err(ProposalError::TooManyItems {
                field: "known_unknowns",
                length: self.known_unknowns.len() + 1,
            });
        }
        self.known_unknowns.push(unknown.into());
        Ok(self)
    }

    /// Record a symbolic action.
    ///
    /// # Errors
    ///
    /// Returns [`ProposalError::TooManyItems`] past the bound.
    pub fn with_symbolic_action(mut self, action: SymbolicAction) -> Result<Self, ProposalError> {
        if self.symbolic_actions.len() >= MAX_PROPOSAL_ITEMS {
            return Err(ProposalError::TooManyItems {
                field: "symbolic_actions",
                length: self.symbolic_actions.len() + 1,
            });
        }
        self.symbolic_actions.push(action);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proposal_construction_validates_bounds() {
        assert!(matches!(
            Proposal::new("", (0.1, 0.5)),
            Err(ProposalError::TextOutOfBounds { length: 0 })
        ));
        assert!(matches!(
            Proposal::new("do the thing", (0.9, 0.2)),
            Err(ProposalError::InvalidConfidenceRange { .. })
        ));
        assert!(matches!(
            Proposal::new("do the thing", (0.0, 1.5)),
            Err(ProposalError::InvalidConfidenceRange { .. })
        ));
    }

    #[test]
    fn proposal_round_trips_through_serde() {
        let proposal = Proposal::new("reorganize /tmp", (0.3, 0.6))
            .expect("proposal")
            .with_assumption("nothing important lives in /tmp")
            .expect("assumption")
            .with_known_unknown("whether anything is watching /tmp")
            .expect("unknown")
            .with_symbolic_action(SymbolicAction {
                name: "move_files".to_string(),
                arguments: [("from".to_string(), serde_json::Value::from("/tmp"))]
                    .into_iter()
                    .collect(),
            })
            .expect("action");

        let json = serde_json::to_string(&proposal).expect("serialize");
        let back: Proposal = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, proposal);
        assert!(back.proposal_id.starts_with("PRP-"));
    }
}
