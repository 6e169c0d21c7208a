//! Read-only evidence export and pure verification.
//!
//! Export serializes a sealed bundle to its canonical bytes; it is
//! side-effect-free. [`verify`] takes bytes back in, checks structure and
//! the hash chain, and reports `ok`, `mismatch`, or `malformed`. It never
//! evaluates correctness, triggers no execution, and touches no mutable
//! state; it is a free function over a byte slice.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::canonical;
use crate::clock::Tick;
use crate::failure::FailureComposition;
use crate::snapshot::Snapshot;

use super::{
    BundleOutcome, ContextSnapshot, EvidenceBundle, EvidenceError, GrantSnapshot, IntentSnapshot,
    PrincipalSnapshot, chain_root,
};

// =============================================================================
// Wire form
// =============================================================================

/// Serialized bundle layout.
///
/// Both `failure_composition` and `results` keys are always present so the
/// canonical bytes have a fixed shape; exactly one of them is non-null.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireBundle {
    bundle_id: String,
    created_at: Tick,
    context_snapshot: ContextSnapshot,
    intent_snapshot: IntentSnapshot,
    principal_snapshot: PrincipalSnapshot,
    grant_snapshot: Option<GrantSnapshot>,
    execution_snapshots: Vec<Snapshot>,
    failure_composition: Option<FailureComposition>,
    results: Option<Vec<Value>>,
    authority_version: u64,
    hash_chain_root: String,
}

impl From<&EvidenceBundle> for WireBundle {
    fn from(bundle: &EvidenceBundle) -> Self {
        let (failure_composition, results) = match bundle.outcome() {
            BundleOutcome::Failure(composition) => (Some(composition.clone()), None),
            BundleOutcome::Results(values) => (None, Some(values.clone())),
        };
        Self {
            bundle_id: bundle.bundle_id.clone(),
            created_at: bundle.created_at,
            context_snapshot: bundle.context_snapshot.clone(),
            intent_snapshot: bundle.intent_snapshot.clone(),
            principal_snapshot: bundle.principal_snapshot.clone(),
            grant_snapshot: bundle.grant_snapshot.clone(),
            execution_snapshots: bundle.execution_snapshots.clone(),
            failure_composition,
            results,
            authority_version: bundle.authority_version,
            hash_chain_root: bundle.hash_chain_root.clone(),
        }
    }
}

// =============================================================================
// Exporter
// =============================================================================

/// Errors produced by evidence export.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ExportError {
    /// The bundle id resolved to nothing.
    #[error("bundle '{bundle_id}' is unknown")]
    NotFound {
        /// The unresolved id.
        bundle_id: String,
    },

    /// The bundle could not be serialized.
    #[error("bundle export failed: {0}")]
    Serialization(#[from] EvidenceError),
}

/// Owner of sealed bundles; the only read surface over evidence.
#[derive(Debug, Default)]
pub struct EvidenceExporter {
    bundles: RwLock<BTreeMap<String, Arc<EvidenceBundle>>>,
}

impl EvidenceExporter {
    /// Create an empty exporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a sealed bundle. Kernel-internal: bundles are
    /// sealed only by the guard, after terminal halt.
    pub(crate) fn store(&self, bundle: EvidenceBundle) -> Arc<EvidenceBundle> {
        let bundle = Arc::new(bundle);
        self.write_bundles()
            .insert(bundle.bundle_id.clone(), bundle.clone());
        bundle
    }

    /// Fetch a sealed bundle by id.
    #[must_use]
    pub fn get(&self, bundle_id: &str) -> Option<Arc<EvidenceBundle>> {
        self.read_bundles().get(bundle_id).cloned()
    }

    /// Export one bundle as canonical bytes.
    ///
    /// # Errors
    ///
    /// - [`ExportError::NotFound`] for an unknown id.
    /// - [`ExportError::Serialization`] if canonical serialization fails.
    pub fn export(&self, bundle_id: &str) -> Result<Vec<u8>, ExportError> {
        let bundle = self.get(bundle_id).ok_or_else(|| ExportError::NotFound {
            bundle_id: bundle_id.to_string(),
        })?;
        let wire = WireBundle::from(bundle.as_ref());
        let json = canonical::to_canonical_json(&wire)
            .map_err(|e| ExportError::Serialization(EvidenceError::Canonical(e)))?;
        Ok(json.into_bytes())
    }

    /// Export every bundle keyed by id, as canonical bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Serialization`] if canonical serialization
    /// fails.
    pub fn export_all(&self) -> Result<Vec<u8>, ExportError> {
        let wires: BTreeMap<String, WireBundle> = self
            .read_bundles()
            .iter()
            .map(|(id, bundle)| (id.clone(), WireBundle::from(bundle.as_ref())))
            .collect();
        let json = canonical::to_canonical_json(&wires)
            .map_err(|e| ExportError::Serialization(EvidenceError::Canonical(e)))?;
        Ok(json.into_bytes())
    }

    /// Number of stored bundles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read_bundles().len()
    }

    /// Whether no bundle is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_bundles(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Arc<EvidenceBundle>>> {
        self.bundles
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write_bundles(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, Arc<EvidenceBundle>>> {
        self.bundles
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

// =============================================================================
// Verification
// =============================================================================

/// Verification verdict over exported bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Structure complete and hash chain consistent.
    Ok,
    /// Structure complete but the hash chain does not reproduce the root.
    Mismatch,
    /// The bytes do not parse into a complete bundle.
    Malformed,
}

/// Structured result of a verification pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    /// The verdict.
    pub outcome: VerifyOutcome,
    /// Bundle id, when the bytes parsed far enough to name one.
    pub bundle_id: Option<String>,
    /// Machine-adjacent detail for mismatch/malformed verdicts.
    pub detail: Option<String>,
}

/// Verify exported bundle bytes.
///
/// Pure: no side effects, no execution, no mutable state. Confirms only
/// integrity (the hash chain reproduces the recorded root) and completeness
/// (all required fields present, exactly one outcome), never correctness.
#[must_use]
pub fn verify(bytes: &[u8]) -> VerificationResult {
    let wire: WireBundle = match serde_json::from_slice(bytes) {
        Ok(wire) => wire,
        Err(e) => {
            return VerificationResult {
                outcome: VerifyOutcome::Malformed,
                bundle_id: None,
                detail: Some(e.to_string()),
            };
        }
    };

    let outcome = match (&wire.failure_composition, &wire.results) {
        (Some(composition), None) => BundleOutcome::Failure(composition.clone()),
        (None, Some(results)) => BundleOutcome::Results(results.clone()),
        _ => {
            return VerificationResult {
                outcome: VerifyOutcome::Malformed,
                bundle_id: Some(wire.bundle_id),
                detail: Some("exactly one of failure_composition or results is required".into()),
            };
        }
    };

    let recomputed = chain_root(
        &wire.bundle_id,
        wire.created_at,
        &wire.context_snapshot,
        &wire.intent_snapshot,
        &wire.principal_snapshot,
        wire.grant_snapshot.as_ref(),
        &wire.execution_snapshots,
        &outcome,
        wire.authority_version,
    );
    let recomputed = match recomputed {
        Ok(root) => root,
        Err(e) => {
            return VerificationResult {
                outcome: VerifyOutcome::Malformed,
                bundle_id: Some(wire.bundle_id),
                detail: Some(e.to_string()),
            };
        }
    };

    if recomputed == wire.hash_chain_root {
        VerificationResult {
            outcome: VerifyOutcome::Ok,
            bundle_id: Some(wire.bundle_id),
            detail: None,
        }
    } else {
        VerificationResult {
            outcome: VerifyOutcome::Mismatch,
            bundle_id: Some(wire.bundle_id),
            detail: Some("hash chain root does not reproduce".into()),
        }
    }
}
