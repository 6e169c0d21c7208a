//! Kernel configuration.
//!
//! [`KernelConfig`] carries the structural bounds of one kernel instance.
//! These are limits, not policy: friction durations and confidence floors
//! are fixed tables (see [`crate::friction`] and [`crate::capability`]) and
//! deliberately not configurable.

use serde::Deserialize;

/// Default maximum length for identifier strings (context, principal,
/// grant, snapshot, bundle ids).
pub const DEFAULT_MAX_ID_LENGTH: usize = 256;

/// Default maximum number of explicit context fields per invocation.
pub const DEFAULT_MAX_CONTEXT_FIELDS: usize = 64;

/// Default bounded-channel capacity per registered observer.
pub const DEFAULT_OBSERVER_CHANNEL_CAPACITY: usize = 256;

/// Default cap for snapshot listing queries.
pub const DEFAULT_SNAPSHOT_LIST_LIMIT: usize = 100;

/// Structural bounds for a kernel instance.
///
/// All fields have defaults; a zero-configuration kernel is valid.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KernelConfig {
    /// Maximum length for identifier strings.
    pub max_id_length: usize,

    /// Maximum number of explicit context fields per invocation.
    pub max_context_fields: usize,

    /// Bounded-channel capacity per registered observer. Events past this
    /// backlog are dropped for that observer; admission is never blocked.
    pub observer_channel_capacity: usize,

    /// Cap for snapshot listing queries.
    pub snapshot_list_limit: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_id_length: DEFAULT_MAX_ID_LENGTH,
            max_context_fields: DEFAULT_MAX_CONTEXT_FIELDS,
            observer_channel_capacity: DEFAULT_OBSERVER_CHANNEL_CAPACITY,
            snapshot_list_limit: DEFAULT_SNAPSHOT_LIST_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_nonzero() {
        let config = KernelConfig::default();
        assert!(config.max_id_length > 0);
        assert!(config.max_context_fields > 0);
        assert!(config.observer_channel_capacity > 0);
        assert!(config.snapshot_list_limit > 0);
    }

    #[test]
    fn deserializes_with_partial_overrides() {
        let config: KernelConfig =
            serde_json::from_str(r#"{"max_context_fields": 8}"#).expect("valid config");
        assert_eq!(config.max_context_fields, 8);
        assert_eq!(config.max_id_length, DEFAULT_MAX_ID_LENGTH);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let parsed = serde_json::from_str::<KernelConfig>(r#"{"friction_override": 0}"#);
        assert!(parsed.is_err());
    }
}
