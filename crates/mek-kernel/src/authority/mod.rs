//! Principals, time-bound grants, revocation.
//!
//! Authority is data plus enforcement: a [`Grant`] is a frozen value whose
//! single mutable aspect, the remaining bounded uses, lives behind the
//! atomic [`UseCounter`]. The [`AuthorityStore`] owns all grants and
//! revocation events, maintains the global monotonic authority version, and
//! guarantees that concurrent admissions can never jointly consume a grant
//! past its bound.
//!
//! Revocation is terminal. There is no un-revoke; a second revocation of
//! the same grant is a no-op, not an error.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::clock::Tick;


/// Maximum length of a principal identifier.
pub const MAX_PRINCIPAL_ID_LENGTH: usize = 256;

// =============================================================================
// Principal
// =============================================================================

/// Opaque actor identifier. No hierarchy, no roles, no inference of one
/// principal from another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Principal {
    /// The opaque identifier.
    pub principal_id: String,
}

impl Principal {
    /// Create a principal.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::InvalidPrincipal`] for an empty or
    /// over-long identifier.
    pub fn new(principal_id: impl Into<String>) -> Result<Self, AuthorityError> {
        let principal_id = principal_id.into();
        if principal_id.is_empty() || principal_id.len() > MAX_PRINCIPAL_ID_LENGTH {
            return Err(AuthorityError::InvalidPrincipal {
                length: principal_id.len(),
            });
        }
        Ok(Self { principal_id })
    }
}

// =============================================================================
// UseCounter
// =============================================================================

/// Atomic remaining-uses counter, the only mutable field in the system.
///
/// Reservation is a compare-exchange loop: the decrement is linearizable
/// across admissions and can never push the counter below zero.
#[derive(Debug, Clone)]
pub struct UseCounter(Arc<AtomicI64>);

impl UseCounter {
    /// Counter starting at `max_uses`.
    #[must_use]
    pub fn new(max_uses: u32) -> Self {
        Self(Arc::new(AtomicI64::new(i64::from(max_uses))))
    }

    /// Remaining uses at this instant.
    #[must_use]
    pub fn remaining(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Atomically reserve one use, returning the post-reservation value.
    ///
    /// Returns `None` when no use remains; the counter is unchanged and can
    /// never go negative.
    #[must_use]
    pub fn try_reserve(&self) -> Option<i64> {
        let mut current = self.0.load(Ordering::SeqCst);
        loop {
            if current <= 0 {
                return None;
            }
            match self.0.compare_exchange(
                current,
                current - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Some(current - 1),
                Err(observed) => current = observed,
            }
        }
    }
}

// =============================================================================
// Grant / RevocationEvent
// =============================================================================

/// Time- and use-bounded authorization for (principal, capability).
///
/// Frozen after issuance apart from the atomic use counter. Scope is an
/// opaque structured value: the guard hashes it canonically and never
/// interprets it; capability implementations do.
#[derive(Debug, Clone)]
pub struct Grant {
    /// Unique identifier (`GRT-<uuid>`).
    pub grant_id: String,
    /// Principal the grant authorizes.
    pub principal_id: String,
    /// Capability the grant authorizes.
    pub capability_name: String,
    /// Capability-defined structured scope, hashed but never interpreted
    /// by the kernel.
    pub scope: Value,
    /// Monotonic issuance tick.
    pub issued_at: Tick,
    /// Monotonic expiry tick.
    pub expires_at: Tick,
    /// Bound on uses, if any.
    pub max_uses: Option<u32>,
    /// Whether the grant can be revoked.
    pub revocable: bool,
    remaining: Option<UseCounter>,
}

impl Grant {
    /// Issue a grant value. Store-internal; issuance goes through
    /// [`AuthorityStore::issue`].
    pub(crate) fn issue(
        principal_id: String,
        capability_name: String,
        scope: Value,
        issued_at: Tick,
        expires_at: Tick,
        max_uses: Option<u32>,
        revocable: bool,
    ) -> Self {
        Self {
            grant_id: format!("GRT-{}", uuid::Uuid::new_v4()),
            principal_id,
            capability_name,
            scope,
            issued_at,
            expires_at,
            max_uses,
            revocable,
            remaining: max_uses.map(UseCounter::new),
        }
    }

    /// Whether the grant's expiry tick has passed.
    #[must_use]
    pub fn is_expired(&self, now: Tick) -> bool {
        now >= self.expires_at
    }

    /// Remaining uses, `None` when unbounded.
    #[must_use]
    pub fn remaining_uses(&self) -> Option<i64> {
        self.remaining.as_ref().map(UseCounter::remaining)
    }

    fn is_exhausted(&self) -> bool {
        self.remaining_uses() == Some(0)
    }
}

/// Closed set of revocation reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum RevocationReason {
    /// A principal explicitly withdrew the grant.
    ExplicitRevocation,
    /// The grant was implicated in a security violation.
    SecurityViolation,
    /// The holding principal is compromised.
    PrincipalCompromised,
    /// The grant leaked outside its intended holder.
    GrantLeak,
    /// Policy time limit exceeded.
    TimeLimitExceeded,
}

/// Terminal, irreversible revocation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RevocationEvent {
    /// The grant that died.
    pub grant_id: String,
    /// Principal that revoked it.
    pub revoked_by_principal: String,
    /// Why.
    pub reason: RevocationReason,
    /// Monotonic tick of revocation.
    pub revoked_at: Tick,
}

// =============================================================================
// AuthorityError
// =============================================================================

/// Failure modes of the authority store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthorityError {
    /// No grant exists for (principal, capability).
    #[error("no grant for principal '{principal_id}' on capability '{capability_name}'")]
    MissingGrant {
        /// Requesting principal.
        principal_id: String,
        /// Requested capability.
        capability_name: String,
    },

    /// The grant's expiry tick has passed.
    #[error("grant '{grant_id}' expired at tick {expires_at} (now: {now})")]
    ExpiredGrant {
        /// The dead grant.
        grant_id: String,
        /// Its expiry tick.
        expires_at: Tick,
        /// The observing tick.
        now: Tick,
    },

    /// The grant has been revoked.
    #[error("grant '{grant_id}' is revoked")]
    RevokedGrant {
        /// The dead grant.
        grant_id: String,
    },

    /// The grant's bounded uses are exhausted.
    #[error("grant '{grant_id}' has no remaining uses")]
    ExhaustedGrant {
        /// The exhausted grant.
        grant_id: String,
    },

    /// The grant's scope is not a canonical object.
    #[error("grant scope must be a structured object")]
    InvalidGrantScope,

    /// A grant id collided at insertion.
    #[error("grant '{grant_id}' already exists")]
    DuplicateGrant {
        /// The colliding id.
        grant_id: String,
    },

    /// A grant id resolved to nothing.
    #[error("grant '{grant_id}' is unknown")]
    UnknownGrant {
        /// The unresolved id.
        grant_id: String,
    },

    /// Principal identifier out of bounds.
    #[error("principal_id must be 1..={MAX_PRINCIPAL_ID_LENGTH} bytes, got {length}")]
    InvalidPrincipal {
        /// Observed length.
        length: usize,
    },

    /// Grant lifetime is empty or inverted.
    #[error("grant must expire after issuance (issued_at {issued_at}, expires_at {expires_at})")]
    InvalidLifetime {
        /// Issuance tick.
        issued_at: Tick,
        /// Expiry tick.
        expires_at: Tick,
    },

    /// `max_uses` of zero would issue dead authority.
    #[error("max_uses must be positive when bounded")]
    ZeroMaxUses,
}

// =============================================================================
// AuthorityStore
// =============================================================================

#[derive(Debug, Default)]
struct StoreState {
    grants: HashMap<String, Grant>,
    revocations: HashMap<String, RevocationEvent>,
    by_subject: HashMap<(String, String), BTreeSet<String>>,
}

/// In-memory authority table plus the global monotonic authority version.
///
/// The version is bumped on every grant issuance, revocation, and
/// consumption-to-zero. Any snapshot whose captured version differs from
/// the current version is stale.
#[derive(Debug, Default)]
pub struct AuthorityStore {
    state: RwLock<StoreState>,
    version: AtomicU64,
}

impl AuthorityStore {
    /// Create an empty store at authority version zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current authority version.
    #[must_use]
    pub fn authority_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Bump the authority version, returning the new value.
    pub fn bump_authority_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Issue a grant and index it.
    ///
    /// Issuance is an external-authority operation: the guard's admission
    /// path never calls this, and nothing in the kernel synthesizes or
    /// extends grants.
    ///
    /// # Errors
    ///
    /// - [`AuthorityError::InvalidPrincipal`] for a malformed principal.
    /// - [`AuthorityError::InvalidGrantScope`] if scope is not an object.
    /// - [`AuthorityError::InvalidLifetime`] for an empty lifetime.
    /// - [`AuthorityError::ZeroMaxUses`] for a bounded grant with no uses.
    #[allow(clippy::too_many_arguments)]
    pub fn issue(
        &self,
        principal_id: &str,
        capability_name: &str,
        scope: Value,
        issued_at: Tick,
        expires_at: Tick,
        max_uses: Option<u32>,
        revocable: bool,
    ) -> Result<Grant, AuthorityError> {
        let principal = Principal::new(principal_id)?;
        if !scope.is_object() {
            return Err(AuthorityError::InvalidGrantScope);
        }
        if expires_at <= issued_at {
            return Err(AuthorityError::InvalidLifetime {
                issued_at,
                expires_at,
            });
        }
        if max_uses == Some(0) {
            return Err(AuthorityError::ZeroMaxUses);
        }

        let grant = Grant::issue(
            principal.principal_id,
            capability_name.to_string(),
            scope,
            issued_at,
            expires_at,
            max_uses,
            revocable,
        );

        let mut state = self.write_state();
        if state.grants.contains_key(&grant.grant_id) {
            return Err(AuthorityError::DuplicateGrant {
                grant_id: grant.grant_id,
            });
        }
        state
            .by_subject
            .entry((grant.principal_id.clone(), grant.capability_name.clone()))
            .or_default()
            .insert(grant.grant_id.clone());
        state.grants.insert(grant.grant_id.clone(), grant.clone());
        drop(state);

        self.bump_authority_version();
        tracing::debug!(
            grant_id = %grant.grant_id,
            principal_id = %grant.principal_id,
            capability = %grant.capability_name,
            expires_at = grant.expires_at,
            "grant issued"
        );
        Ok(grant)
    }

    /// Resolve the grant an admission should be judged against.
    ///
    /// Among live grants for (principal, capability) the winner is the one
    /// dying soonest (earliest `expires_at`; ties break on grant id). When
    /// no live grant exists but dead ones do, the most recently expiring
    /// dead grant is returned so the admission pipeline can refuse with the
    /// precise cause (expired / revoked / exhausted) rather than a generic
    /// missing-grant refusal.
    #[must_use]
    pub fn lookup(&self, principal_id: &str, capability_name: &str, now: Tick) -> Option<Grant> {
        let state = self.read_state();
        let ids = state
            .by_subject
            .get(&(principal_id.to_string(), capability_name.to_string()))?;
        let candidates: Vec<&Grant> = ids.iter().filter_map(|id| state.grants.get(id)).collect();

        let live = candidates
            .iter()
            .filter(|g| {
                !state.revocations.contains_key(&g.grant_id)
                    && !g.is_expired(now)
                    && !g.is_exhausted()
            })
            .min_by(|a, b| {
                a.expires_at
                    .cmp(&b.expires_at)
                    .then_with(|| a.grant_id.cmp(&b.grant_id))
            });
        if let Some(grant) = live {
            return Some((*grant).clone());
        }
        candidates
            .iter()
            .max_by(|a, b| {
                a.expires_at
                    .cmp(&b.expires_at)
                    .then_with(|| a.grant_id.cmp(&b.grant_id))
            })
            .map(|g| (*g).clone())
    }

    /// Fetch a grant by id.
    #[must_use]
    pub fn grant(&self, grant_id: &str) -> Option<Grant> {
        self.read_state().grants.get(grant_id).cloned()
    }

    /// Atomically reserve one use of a bounded grant.
    ///
    /// Returns the post-reservation count, or `None` for an unbounded
    /// grant. The transition to zero bumps the authority version exactly
    /// once: the reserving thread that observes the zero owns the bump.
    ///
    /// # Errors
    ///
    /// - [`AuthorityError::UnknownGrant`] for an unresolved grant id.
    /// - [`AuthorityError::ExhaustedGrant`] when no use remains.
    pub fn consume(&self, grant_id: &str) -> Result<Option<i64>, AuthorityError> {
        let counter = {
            let state = self.read_state();
            let grant = state
                .grants
                .get(grant_id)
                .ok_or_else(|| AuthorityError::UnknownGrant {
                    grant_id: grant_id.to_string(),
                })?;
            grant.remaining.clone()
        };
        let Some(counter) = counter else {
            return Ok(None);
        };
        match counter.try_reserve() {
            Some(0) => {
                self.bump_authority_version();
                tracing::debug!(grant_id = %grant_id, "grant consumed to zero");
                Ok(Some(0))
            }
            Some(remaining) => Ok(Some(remaining)),
            None => Err(AuthorityError::ExhaustedGrant {
                grant_id: grant_id.to_string(),
            }),
        }
    }

    /// Revoke a grant. Idempotent: the first revocation is recorded and
    /// bumps the authority version; any later revocation of the same grant
    /// returns the original event untouched.
    pub fn revoke(
        &self,
        grant_id: &str,
        revoked_by_principal: &str,
        reason: RevocationReason,
        now: Tick,
    ) -> RevocationEvent {
        let mut state = self.write_state();
        if let Some(existing) = state.revocations.get(grant_id) {
            return existing.clone();
        }
        let event = RevocationEvent {
            grant_id: grant_id.to_string(),
            revoked_by_principal: revoked_by_principal.to_string(),
            reason,
            revoked_at: now,
        };
        state.revocations.insert(grant_id.to_string(), event.clone());
        drop(state);

        self.bump_authority_version();
        tracing::debug!(grant_id = %grant_id, reason = ?reason, "grant revoked");
        event
    }

    /// Whether a grant has been revoked.
    #[must_use]
    pub fn is_revoked(&self, grant_id: &str) -> bool {
        self.read_state().revocations.contains_key(grant_id)
    }

    /// The revocation event for a grant, if any.
    #[must_use]
    pub fn revocation(&self, grant_id: &str) -> Option<RevocationEvent> {
        self.read_state().revocations.get(grant_id).cloned()
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, StoreState> {
        self.state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, StoreState> {
        self.state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
