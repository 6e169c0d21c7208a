//! Hash-chained, verifiable evidence bundles.
//!
//! A bundle is built once, after an admission reaches its terminal state,
//! and never re-enters execution. It records the inputs (context, intent,
//! principal, grant), the reality snapshots captured during the run, and
//! exactly one of a failure composition or success results — never both, a
//! constraint the type system enforces via [`BundleOutcome`].
//!
//! Integrity comes from the hash chain ([`hash_chain::HashChain`]): the
//! root folds every element's canonical serialization in a fixed order, so
//! any post-seal byte flip is detectable by recomputation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::authority::Grant;
use crate::canonical::CanonicalError;
use crate::clock::Tick;
use crate::failure::FailureComposition;
use crate::snapshot::Snapshot;

pub mod hash_chain;

mod export;

#[cfg(test)]
mod tests;

pub use export::{EvidenceExporter, ExportError, VerificationResult, VerifyOutcome, verify};

use hash_chain::HashChain;

// =============================================================================
// Input snapshots
// =============================================================================

/// Context as recorded into evidence.
///
/// Confidence is optional here — and only here — because a refusal for a
/// missing confidence still gets a bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContextSnapshot {
    /// Invocation id as submitted.
    pub context_id: String,
    /// Principal as submitted.
    pub principal_id: String,
    /// Intent as submitted.
    pub intent_name: String,
    /// Confidence as submitted, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Explicit fields as submitted.
    pub fields: std::collections::BTreeMap<String, Value>,
    /// Monotonic tick of the record.
    pub recorded_at: Tick,
}

/// Declared intent as recorded into evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntentSnapshot {
    /// Declared intent name.
    pub intent_name: String,
    /// Capability the guard was invoked for.
    pub capability_name: String,
    /// Monotonic tick of the record.
    pub declared_at: Tick,
}

/// Principal as recorded into evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrincipalSnapshot {
    /// Principal identifier as submitted.
    pub principal_id: String,
    /// Monotonic tick of the record.
    pub recorded_at: Tick,
}

/// Grant as recorded into evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrantSnapshot {
    /// Grant identifier.
    pub grant_id: String,
    /// Holding principal.
    pub principal_id: String,
    /// Granted capability.
    pub capability_name: String,
    /// Opaque scope value.
    pub scope: Value,
    /// Issuance tick.
    pub issued_at: Tick,
    /// Expiry tick.
    pub expires_at: Tick,
    /// Remaining bounded uses at record time, `None` when unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_uses: Option<i64>,
}

impl GrantSnapshot {
    /// Record a grant's state at this instant.
    #[must_use]
    pub fn of(grant: &Grant) -> Self {
        Self {
            grant_id: grant.grant_id.clone(),
            principal_id: grant.principal_id.clone(),
            capability_name: grant.capability_name.clone(),
            scope: grant.scope.clone(),
            issued_at: grant.issued_at,
            expires_at: grant.expires_at,
            remaining_uses: grant.remaining_uses(),
        }
    }
}

// =============================================================================
// Outcome / bundle
// =============================================================================

/// The terminal outcome sealed into a bundle.
///
/// Failure and success are mutually exclusive at the type level; a bundle
/// cannot present both.
#[derive(Debug, Clone, PartialEq)]
pub enum BundleOutcome {
    /// The run refused; the ordered failures.
    Failure(FailureComposition),
    /// The run succeeded; per-step results in step order.
    Results(Vec<Value>),
}

/// Errors in bundle construction and recomputation.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum EvidenceError {
    /// An element could not be canonically serialized.
    #[error("bundle element could not be sealed: {0}")]
    Canonical(#[from] CanonicalError),
}

/// Immutable post-halt evidence container.
#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceBundle {
    /// Unique identifier (`BDL-<uuid>`).
    pub bundle_id: String,
    /// Monotonic tick the bundle was sealed at.
    pub created_at: Tick,
    /// Context record.
    pub context_snapshot: ContextSnapshot,
    /// Intent record.
    pub intent_snapshot: IntentSnapshot,
    /// Principal record.
    pub principal_snapshot: PrincipalSnapshot,
    /// Grant record, if a grant was in play.
    pub grant_snapshot: Option<GrantSnapshot>,
    /// Reality snapshots captured during the run, in admission order.
    pub execution_snapshots: Vec<Snapshot>,
    outcome: BundleOutcome,
    /// Authority version at halt.
    pub authority_version: u64,
    /// Root of the element hash chain.
    pub hash_chain_root: String,
}

impl EvidenceBundle {
    /// Seal a bundle, computing its hash-chain root.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceError::Canonical`] if any element cannot be
    /// canonically serialized.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn seal(
        created_at: Tick,
        context_snapshot: ContextSnapshot,
        intent_snapshot: IntentSnapshot,
        principal_snapshot: PrincipalSnapshot,
        grant_snapshot: Option<GrantSnapshot>,
        execution_snapshots: Vec<Snapshot>,
        outcome: BundleOutcome,
        authority_version: u64,
    ) -> Result<Self, EvidenceError> {
        let bundle_id = format!("BDL-{}", uuid::Uuid::new_v4());
        let hash_chain_root = chain_root(
            &bundle_id,
            created_at,
            &context_snapshot,
            &intent_snapshot,
            &principal_snapshot,
            grant_snapshot.as_ref(),
            &execution_snapshots,
            &outcome,
            authority_version,
        )?;
        Ok(Self {
            bundle_id,
            created_at,
            context_snapshot,
            intent_snapshot,
            principal_snapshot,
            grant_snapshot,
            execution_snapshots,
            outcome,
            authority_version,
            hash_chain_root,
        })
    }

    /// The sealed outcome.
    #[must_use]
    pub fn outcome(&self) -> &BundleOutcome {
        &self.outcome
    }

    /// The failure composition, when the run refused.
    #[must_use]
    pub fn failure_composition(&self) -> Option<&FailureComposition> {
        match &self.outcome {
            BundleOutcome::Failure(composition) => Some(composition),
            BundleOutcome::Results(_) => None,
        }
    }

    /// The success results, when the run succeeded.
    #[must_use]
    pub fn results(&self) -> Option<&[Value]> {
        match &self.outcome {
            BundleOutcome::Failure(_) => None,
            BundleOutcome::Results(results) => Some(results),
        }
    }

    /// Recompute the hash-chain root from the bundle's current elements.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceError::Canonical`] if any element cannot be
    /// canonically serialized.
    pub fn recompute_root(&self) -> Result<String, EvidenceError> {
        chain_root(
            &self.bundle_id,
            self.created_at,
            &self.context_snapshot,
            &self.intent_snapshot,
            &self.principal_snapshot,
            self.grant_snapshot.as_ref(),
            &self.execution_snapshots,
            &self.outcome,
            self.authority_version,
        )
    }
}

/// Fold the documented element order into a chain root.
///
/// Order: context, intent, principal, grant (or a null tag), execution
/// snapshots in admission order, failure events in order or results in
/// step order, authority version.
#[allow(clippy::too_many_arguments)]
fn chain_root(
    bundle_id: &str,
    created_at: Tick,
    context: &ContextSnapshot,
    intent: &IntentSnapshot,
    principal: &PrincipalSnapshot,
    grant: Option<&GrantSnapshot>,
    execution_snapshots: &[Snapshot],
    outcome: &BundleOutcome,
    authority_version: u64,
) -> Result<String, EvidenceError> {
    let mut chain = HashChain::seed(bundle_id, created_at);
    chain.push(context)?;
    chain.push(intent)?;
    chain.push(principal)?;
    match grant {
        Some(grant) => chain.push(grant)?,
        None => chain.push(&Value::Null)?,
    }
    for snapshot in execution_snapshots {
        chain.push(snapshot)?;
    }
    match outcome {
        BundleOutcome::Failure(composition) => {
            for event in composition.events() {
                chain.push(event)?;
            }
        }
        BundleOutcome::Results(results) => {
            for result in results {
                chain.push(result)?;
            }
        }
    }
    chain.push(&authority_version)?;
    Ok(chain.root_hex())
}
