//! Capability contracts and their registry.
//!
//! A [`CapabilityContract`] declares a name, a consequence level, and the
//! exact context fields the capability receives. The execute function is a
//! private field: the only path to it is [`CapabilityContract::invoke`],
//! which is crate-private and called exclusively by the guard's admission
//! pipeline. The public [`CapabilityContract::execute`] surface exists only
//! to refuse — direct execution is a taxonomy entry, not a possibility.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::canonical;
use crate::context::Context;

// =============================================================================
// Consequence
// =============================================================================

/// Static risk class of a capability.
///
/// The consequence level fixes the friction base and the confidence floor;
/// neither is configurable or learnable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", deny_unknown_fields)]
pub enum Consequence {
    /// No friction, no confidence floor.
    Low,
    /// 3 seconds of friction; confidence floor 0.5.
    Medium,
    /// 10 seconds of friction; confidence floor 0.7.
    High,
}

impl Consequence {
    /// Base friction delay for this consequence level.
    #[must_use]
    pub fn friction_base(self) -> Duration {
        match self {
            Self::Low => Duration::ZERO,
            Self::Medium => Duration::from_secs(3),
            Self::High => Duration::from_secs(10),
        }
    }

    /// Minimum admissible confidence, if this level demands one.
    #[must_use]
    pub fn confidence_floor(self) -> Option<f64> {
        match self {
            Self::Low => None,
            Self::Medium => Some(0.5),
            Self::High => Some(0.7),
        }
    }
}

impl std::fmt::Display for Consequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        };
        f.write_str(label)
    }
}

// =============================================================================
// CapabilityError
// =============================================================================

/// Errors a capability execution can produce.
///
/// The guard converts any of these into an `execution_error` refusal; they
/// never cross the guard boundary as errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CapabilityError {
    /// The capability's own logic failed.
    #[error("capability failed: {message}")]
    Failed {
        /// Capability-supplied description.
        message: String,
    },

    /// The capability enforced its own timeout.
    #[error("capability timed out after {elapsed_ms}ms")]
    Timeout {
        /// Milliseconds elapsed before the capability gave up.
        elapsed_ms: u64,
    },

    /// The contract's public execute surface was called directly. All
    /// execution flows through the guard; this path only refuses. When
    /// this error surfaces through an admission, the guard converts it to
    /// a [`crate::failure::FailureType::DirectExecutionAttempt`] refusal.
    #[error("direct execution of capability '{capability}' is forbidden")]
    DirectExecution {
        /// The capability whose execute surface was hit.
        capability: String,
    },
}

/// Outcome of one capability execution.
pub type CapabilityResult = Result<Value, CapabilityError>;

type ExecuteFn = Box<dyn Fn(&Context) -> CapabilityResult + Send + Sync>;

// =============================================================================
// CapabilityContract
// =============================================================================

/// Declared power: name, consequence level, required context fields, and a
/// private execution function.
///
/// Contracts are registered once and never mutated. Structural equality for
/// registration purposes covers the declaration (name, consequence,
/// fields); the execution function is opaque.
pub struct CapabilityContract {
    name: String,
    consequence: Consequence,
    required_context_fields: BTreeSet<String>,
    execute_fn: ExecuteFn,
}

impl CapabilityContract {
    /// Declare a capability.
    pub fn new(
        name: impl Into<String>,
        consequence: Consequence,
        required_context_fields: impl IntoIterator<Item = impl Into<String>>,
        execute_fn: impl Fn(&Context) -> CapabilityResult + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            consequence,
            required_context_fields: required_context_fields
                .into_iter()
                .map(Into::into)
                .collect(),
            execute_fn: Box::new(execute_fn),
        }
    }

    /// Declared name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Static risk class.
    #[must_use]
    pub fn consequence(&self) -> Consequence {
        self.consequence
    }

    /// The exact context fields this capability receives.
    #[must_use]
    pub fn required_context_fields(&self) -> &BTreeSet<String> {
        &self.required_context_fields
    }

    /// Direct execution is forbidden.
    ///
    /// This surface exists so that the forbidden path is a visible,
    /// typed refusal rather than a hidden temptation. It never runs the
    /// capability, and the guard turns the error into a
    /// [`crate::failure::FailureType::DirectExecutionAttempt`] event when
    /// it crosses an admission.
    ///
    /// # Errors
    ///
    /// Always returns [`CapabilityError::DirectExecution`].
    pub fn execute(&self, _context: &Context) -> CapabilityResult {
        Err(CapabilityError::DirectExecution {
            capability: self.name.clone(),
        })
    }

    /// Run the private execution function. Guard-internal; there is no
    /// other caller in the crate and no public path to this method.
    pub(crate) fn invoke(&self, context: &Context) -> CapabilityResult {
        (self.execute_fn)(context)
    }

    /// Deterministic hash of this contract's declaration.
    pub(crate) fn scope_hash(&self) -> Result<String, canonical::CanonicalError> {
        #[derive(Serialize)]
        struct Declaration<'a> {
            name: &'a str,
            consequence: Consequence,
            required_context_fields: &'a BTreeSet<String>,
        }
        canonical::hash_canonical(&Declaration {
            name: &self.name,
            consequence: self.consequence,
            required_context_fields: &self.required_context_fields,
        })
    }

    fn declaration_matches(&self, other: &Self) -> bool {
        self.name == other.name
            && self.consequence == other.consequence
            && self.required_context_fields == other.required_context_fields
    }
}

impl std::fmt::Debug for CapabilityContract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // execute_fn is opaque by design.
        f.debug_struct("CapabilityContract")
            .field("name", &self.name)
            .field("consequence", &self.consequence)
            .field("required_context_fields", &self.required_context_fields)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// CapabilityRegistry
// =============================================================================

/// Errors produced by capability registration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RegistryError {
    /// Re-registration with a differing consequence or field set.
    #[error("capability '{name}' is already registered with a different definition")]
    Redefinition {
        /// The capability name that collided.
        name: String,
    },

    /// The contract declaration is malformed (empty name).
    #[error("capability name must be non-empty")]
    EmptyName,
}

/// Registry of capability contracts, written once at client initialization.
///
/// Registration is idempotent by name: registering the identical
/// declaration again is a no-op; a differing declaration is refused. The
/// kernel never creates, mutates, or removes contracts at runtime.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    inner: RwLock<HashMap<String, Arc<CapabilityContract>>>,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a contract.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::EmptyName`] for an unnamed contract.
    /// - [`RegistryError::Redefinition`] if the name is taken by a
    ///   differing declaration.
    pub fn register(&self, contract: CapabilityContract) -> Result<(), RegistryError> {
        if contract.name().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        let mut inner = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(existing) = inner.get(contract.name()) {
            if existing.declaration_matches(&contract) {
                return Ok(());
            }
            return Err(RegistryError::Redefinition {
                name: contract.name().to_string(),
            });
        }
        tracing::debug!(capability = %contract.name(), consequence = %contract.consequence(), "capability registered");
        inner.insert(contract.name().to_string(), Arc::new(contract));
        Ok(())
    }

    /// Resolve a contract by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<CapabilityContract>> {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Number of registered contracts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
