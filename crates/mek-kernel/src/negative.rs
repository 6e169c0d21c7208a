//! Negative capability: prohibited behaviors as visible dead ends.
//!
//! These operations exist so the temptation has a name and the name always
//! refuses. Calling any of them returns [`ProhibitedBehaviorError`],
//! unconditionally. None of them has an implementation to find, enable, or
//! configure.

use thiserror::Error;

/// A structurally prohibited behavior was invoked.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("prohibited behavior '{behavior}' attempted: {operation}")]
pub struct ProhibitedBehaviorError {
    /// Which prohibition was hit.
    pub behavior: &'static str,
    /// Caller-supplied description of what was attempted.
    pub operation: String,
}

fn prohibited(behavior: &'static str, operation: &str) -> ProhibitedBehaviorError {
    ProhibitedBehaviorError {
        behavior,
        operation: operation.to_string(),
    }
}

/// The kernel does not learn.
///
/// # Errors
///
/// Always.
pub fn learn(operation: &str) -> Result<(), ProhibitedBehaviorError> {
    Err(prohibited("learn", operation))
}

/// The kernel does not adapt thresholds, policies, or behavior.
///
/// # Errors
///
/// Always.
pub fn adapt(operation: &str) -> Result<(), ProhibitedBehaviorError> {
    Err(prohibited("adapt", operation))
}

/// The kernel does not retry a refused or failed invocation.
///
/// # Errors
///
/// Always.
pub fn retry(operation: &str) -> Result<(), ProhibitedBehaviorError> {
    Err(prohibited("retry", operation))
}

/// The kernel does not escalate authority.
///
/// # Errors
///
/// Always.
pub fn escalate(operation: &str) -> Result<(), ProhibitedBehaviorError> {
    Err(prohibited("escalate", operation))
}

/// Urgency buys nothing; there is no emergency mode.
///
/// # Errors
///
/// Always.
pub fn urgency_bypass(operation: &str) -> Result<(), ProhibitedBehaviorError> {
    Err(prohibited("urgency_bypass", operation))
}

/// The kernel does not optimize its own checks away.
///
/// # Errors
///
/// Always.
pub fn optimize(operation: &str) -> Result<(), ProhibitedBehaviorError> {
    Err(prohibited("optimize", operation))
}

/// Intent is declared, never inferred.
///
/// # Errors
///
/// Always.
pub fn infer_intent(operation: &str) -> Result<(), ProhibitedBehaviorError> {
    Err(prohibited("infer_intent", operation))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_prohibited_operation_refuses() {
        let attempts: [(&str, fn(&str) -> Result<(), ProhibitedBehaviorError>); 7] = [
            ("learn", learn),
            ("adapt", adapt),
            ("retry", retry),
            ("escalate", escalate),
            ("urgency_bypass", urgency_bypass),
            ("optimize", optimize),
            ("infer_intent", infer_intent),
        ];
        for (behavior, attempt) in attempts {
            let error = attempt("tune thresholds from history").expect_err(behavior);
            assert_eq!(error.behavior, behavior);
            assert_eq!(error.operation, "tune thresholds from history");
        }
    }
}
