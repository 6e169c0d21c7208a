//! Reality-binding snapshots.
//!
//! A [`Snapshot`] records everything that made an execution admissible:
//! who, under which grant, against which capability declaration, with which
//! context and intent (as canonical hashes), at which authority version.
//! The guard captures one before the friction wait and re-validates it
//! after — if the world moved in between, execution is refused. State as
//! evidence, not as assumption.
//!
//! The [`SnapshotStore`] is append-only. Snapshots are never deleted or
//! updated, and each one is admitted through re-validation exactly once.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::authority::Grant;
use crate::canonical::{self, CanonicalError};
use crate::clock::Tick;
use crate::context::{Context, Intent};

#[cfg(test)]
mod tests;

/// Immutable record of the world-slice one execution was admitted against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Snapshot {
    /// Unique identifier (`SNP-<uuid>`).
    pub snapshot_id: String,
    /// Monotonic capture tick.
    pub captured_at: Tick,
    /// Principal that was admitted.
    pub principal_id: String,
    /// Grant the admission ran under.
    pub grant_id: String,
    /// Capability that was admitted.
    pub capability_name: String,
    /// Canonical hash of the capability declaration.
    pub capability_scope_hash: String,
    /// Canonical hash of the context's explicit fields.
    pub context_hash: String,
    /// Canonical hash of the declared intent.
    pub intent_hash: String,
    /// Stated confidence at capture.
    pub confidence_value: f64,
    /// Global authority version at capture.
    pub authority_version: u64,
    /// Grant expiry tick at capture.
    pub grant_expires_at: Tick,
    /// Remaining bounded uses at capture, `None` when unbounded.
    pub grant_remaining_uses_at_capture: Option<i64>,
}

impl Snapshot {
    /// Capture a snapshot of the current admission inputs. Guard-internal.
    pub(crate) fn capture(
        context: &Context,
        intent: &Intent,
        grant: &Grant,
        capability_scope_hash: String,
        authority_version: u64,
        captured_at: Tick,
        remaining_uses: Option<i64>,
    ) -> Result<Self, CanonicalError> {
        Ok(Self {
            snapshot_id: format!("SNP-{}", uuid::Uuid::new_v4()),
            captured_at,
            principal_id: context.principal_id().to_string(),
            grant_id: grant.grant_id.clone(),
            capability_name: grant.capability_name.clone(),
            capability_scope_hash,
            context_hash: hash_context(context)?,
            intent_hash: hash_intent(intent)?,
            confidence_value: context.confidence(),
            authority_version,
            grant_expires_at: grant.expires_at,
            grant_remaining_uses_at_capture: remaining_uses,
        })
    }
}

/// Canonical hash of a context's explicit fields.
pub(crate) fn hash_context(context: &Context) -> Result<String, CanonicalError> {
    canonical::hash_canonical(context.fields())
}

/// Canonical hash of a declared intent.
pub(crate) fn hash_intent(intent: &Intent) -> Result<String, CanonicalError> {
    canonical::hash_canonical(intent)
}

/// Failure modes of the snapshot store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SnapshotError {
    /// A snapshot id was stored or re-validated a second time.
    #[error("snapshot '{snapshot_id}' was already admitted")]
    ReuseAttempt {
        /// The reused id.
        snapshot_id: String,
    },

    /// The snapshot id resolved to nothing.
    #[error("snapshot '{snapshot_id}' is unknown")]
    NotFound {
        /// The unresolved id.
        snapshot_id: String,
    },
}

/// Read-only statistics over the stored snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotStats {
    /// Total stored snapshots.
    pub total: usize,
    /// Stored snapshots per capability.
    pub by_capability: BTreeMap<String, usize>,
}

#[derive(Debug, Default)]
struct StoreInner {
    snapshots: HashMap<String, Snapshot>,
    // Insertion order, for recency-ordered listing.
    order: Vec<String>,
    validated: HashSet<String>,
}

/// Append-only store of issued snapshots keyed by id.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    inner: RwLock<StoreInner>,
}

impl SnapshotStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::ReuseAttempt`] if the id is already stored.
    pub fn insert(&self, snapshot: Snapshot) -> Result<(), SnapshotError> {
        let mut inner = self.write_inner();
        if inner.snapshots.contains_key(&snapshot.snapshot_id) {
            return Err(SnapshotError::ReuseAttempt {
                snapshot_id: snapshot.snapshot_id,
            });
        }
        inner.order.push(snapshot.snapshot_id.clone());
        inner
            .snapshots
            .insert(snapshot.snapshot_id.clone(), snapshot);
        Ok(())
    }

    /// Mark a snapshot as having passed re-validation.
    ///
    /// Each snapshot admits exactly one re-validation; a second attempt is
    /// a reuse.
    ///
    /// # Errors
    ///
    /// - [`SnapshotError::NotFound`] for an unknown id.
    /// - [`SnapshotError::ReuseAttempt`] if the snapshot was already
    ///   re-validated.
    pub fn mark_validated(&self, snapshot_id: &str) -> Result<(), SnapshotError> {
        let mut inner = self.write_inner();
        if !inner.snapshots.contains_key(snapshot_id) {
            return Err(SnapshotError::NotFound {
                snapshot_id: snapshot_id.to_string(),
            });
        }
        if !inner.validated.insert(snapshot_id.to_string()) {
            return Err(SnapshotError::ReuseAttempt {
                snapshot_id: snapshot_id.to_string(),
            });
        }
        Ok(())
    }

    /// Fetch a snapshot by id.
    #[must_use]
    pub fn get(&self, snapshot_id: &str) -> Option<Snapshot> {
        self.read_inner().snapshots.get(snapshot_id).cloned()
    }

    /// List snapshots, most recent first, with optional filters.
    #[must_use]
    pub fn list(
        &self,
        principal_id: Option<&str>,
        capability_name: Option<&str>,
        limit: usize,
    ) -> Vec<Snapshot> {
        let inner = self.read_inner();
        inner
            .order
            .iter()
            .rev()
            .filter_map(|id| inner.snapshots.get(id))
            .filter(|s| principal_id.map_or(true, |p| s.principal_id == p))
            .filter(|s| capability_name.map_or(true, |c| s.capability_name == c))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Statistics over the stored snapshots.
    #[must_use]
    pub fn statistics(&self) -> SnapshotStats {
        let inner = self.read_inner();
        let mut by_capability: BTreeMap<String, usize> = BTreeMap::new();
        for snapshot in inner.snapshots.values() {
            *by_capability
                .entry(snapshot.capability_name.clone())
                .or_default() += 1;
        }
        SnapshotStats {
            total: inner.snapshots.len(),
            by_capability,
        }
    }

    /// Number of stored snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read_inner().snapshots.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_inner(&self) -> std::sync::RwLockReadGuard<'_, StoreInner> {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write_inner(&self) -> std::sync::RwLockWriteGuard<'_, StoreInner> {
        self.inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
