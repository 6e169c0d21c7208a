//! The Guard — the single non-bypassable execution gateway.
//!
//! One kernel instance, one door. Every sensitive action flows through
//! [`Guard::execute`], which runs a total-order admission pipeline; no step
//! is reorderable and every step is a hard gate:
//!
//!  1. Context validity (well-formed id, confidence present and in `[0,1]`)
//!  2. Intent declaration (registered capability; parameters match the
//!     contract exactly — no missing, no extra)
//!  3. Principal presence
//!  4. Grant existence for (principal, capability)
//!  5. Grant not expired
//!  6. Grant not revoked
//!  7. Remaining uses (atomic reservation)
//!  8. Confidence gate (HIGH ≥ 0.7, MEDIUM ≥ 0.5)
//!  9. Snapshot capture (hashes + authority version, stored append-only)
//! 10. Friction gate (blocking wait)
//! 11. Snapshot re-validation (any drift refuses; a revocation or
//!     exhaustion that landed during friction takes effect here)
//! 12. Execution of the contract's private function
//!
//! The first refusal is terminal: it produces a single [`FailureEvent`],
//! later steps never run, and nothing retries. After the terminal halt —
//! success or refusal — an evidence bundle is sealed and offered to the
//! observer hub.

use std::cell::Cell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::authority::{
    AuthorityError, AuthorityStore, Grant, RevocationEvent, RevocationReason,
};
use crate::capability::{CapabilityContract, CapabilityError, CapabilityRegistry, RegistryError};
use crate::clock::{Clock, MonotonicClock, Tick};
use crate::config::KernelConfig;
use crate::context::{Context, ContextDraft, ContextViolation, Intent};
use crate::evidence::{
    BundleOutcome, ContextSnapshot, EvidenceBundle, EvidenceExporter, ExportError, GrantSnapshot,
    IntentSnapshot, PrincipalSnapshot,
};
use crate::failure::{
    AuthorityContext, FailureEvent, FailureResult, FailureType, Invariant, Phase, TriggerCondition,
};
use crate::friction::FrictionParams;
use crate::observer::{Observer, ObserverHub, SubscriberId, details};
use crate::snapshot::{self, Snapshot, SnapshotError, SnapshotStats, SnapshotStore};


thread_local! {
    // Set for the duration of a capability execution on this thread; a
    // nested admission from inside one is a self-invocation.
    static IN_EXECUTION: Cell<bool> = const { Cell::new(false) };
}

// =============================================================================
// Results
// =============================================================================

/// Outcome of one admission. Success data and refusal are mutually
/// exclusive at the type level.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    /// The capability executed; its result data.
    Success {
        /// Capability-produced result.
        data: Value,
    },
    /// The admission refused; the terminal failure result.
    Refusal {
        /// The structured refusal.
        failure: FailureResult,
    },
}

impl ExecutionResult {
    /// Whether the admission succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Success data, if any.
    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Success { data } => Some(data),
            Self::Refusal { .. } => None,
        }
    }

    /// The refusal, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&FailureResult> {
        match self {
            Self::Success { .. } => None,
            Self::Refusal { failure } => Some(failure),
        }
    }
}

/// What one call to [`Guard::execute`] returns: the type-exclusive result
/// plus the id of the evidence bundle sealed for the run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    /// Evidence bundle sealed for this run.
    pub bundle_id: String,
    /// The terminal result.
    pub result: ExecutionResult,
}

// Accumulated admission state, kept for evidence sealing.
struct Trace {
    draft: ContextDraft,
    grant: Option<Grant>,
    snapshot: Option<Snapshot>,
}

// =============================================================================
// Guard
// =============================================================================

/// The kernel instance: authority store, snapshot store, observer hub,
/// evidence subsystem, and the admission pipeline over them.
///
/// Constructed once at startup and passed explicitly to clients. Re-entrant
/// across unrelated invocations; the only globally shared mutation is the
/// atomic authority consumption.
pub struct Guard {
    config: KernelConfig,
    clock: Arc<dyn Clock>,
    capabilities: CapabilityRegistry,
    authority: AuthorityStore,
    snapshots: SnapshotStore,
    observers: ObserverHub,
    evidence: EvidenceExporter,
}

impl std::fmt::Debug for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard")
            .field("capabilities", &self.capabilities.len())
            .field("authority_version", &self.authority.authority_version())
            .field("snapshots", &self.snapshots.len())
            .finish_non_exhaustive()
    }
}

impl Guard {
    /// Create a kernel instance with the production clock.
    #[must_use]
    pub fn new(config: KernelConfig) -> Self {
        Self::with_clock(config, Arc::new(MonotonicClock::new()))
    }

    /// Create a kernel instance driven by an explicit clock.
    #[must_use]
    pub fn with_clock(config: KernelConfig, clock: Arc<dyn Clock>) -> Self {
        let observers = ObserverHub::new(config.observer_channel_capacity);
        Self {
            config,
            clock,
            capabilities: CapabilityRegistry::new(),
            authority: AuthorityStore::new(),
            snapshots: SnapshotStore::new(),
            observers,
            evidence: EvidenceExporter::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Registration and issuance (outside the admission path)
    // -------------------------------------------------------------------------

    /// Register a capability contract. Idempotent by name; registering the
    /// identical declaration again is a no-op.
    ///
    /// # Errors
    ///
    /// Refuses with a [`FailureType::CapabilityRedefinition`] event when the
    /// name is taken by a differing declaration, and with a generic
    /// [`FailureType::GuardRefusal`] for a nameless contract. Registration
    /// refusals are offered to observers like any other; nothing retries
    /// them.
    pub fn register_capability(
        &self,
        contract: CapabilityContract,
    ) -> Result<(), Box<FailureEvent>> {
        let name = contract.name().to_string();
        if let Err(error) = self.capabilities.register(contract) {
            let event = match error {
                RegistryError::Redefinition { .. } => self.fail(
                    Phase::Mek0,
                    FailureType::CapabilityRedefinition,
                    TriggerCondition::CapabilityRedefined,
                ),
                RegistryError::EmptyName => self.fail(
                    Phase::Mek0,
                    FailureType::GuardRefusal,
                    TriggerCondition::CapabilityNameEmpty,
                ),
            };
            tracing::debug!(
                capability = %name,
                failure_type = %event.failure_type,
                "capability registration refused"
            );
            self.observers.emit(
                "registration_refused",
                details([
                    ("capability", Value::from(name)),
                    ("failure_type", Value::from(event.failure_type.as_str())),
                ]),
            );
            return Err(Box::new(event));
        }
        self.observers.emit(
            "capability_registered",
            details([("capability", Value::from(name))]),
        );
        Ok(())
    }

    /// Issue a grant. Issuance is an external-authority operation: it never
    /// runs inside an admission, and the kernel never self-issues.
    ///
    /// # Errors
    ///
    /// Returns the [`AuthorityError`] that made the grant unissuable.
    pub fn issue_grant(
        &self,
        principal_id: &str,
        capability_name: &str,
        scope: Value,
        ttl: Duration,
        max_uses: Option<u32>,
        revocable: bool,
    ) -> Result<Grant, AuthorityError> {
        let now = self.clock.now();
        let expires_at = now.saturating_add(ticks(ttl));
        let grant = self.authority.issue(
            principal_id,
            capability_name,
            scope,
            now,
            expires_at,
            max_uses,
            revocable,
        )?;
        self.observers.emit(
            "grant_issued",
            details([
                ("grant_id", Value::from(grant.grant_id.clone())),
                ("principal_id", Value::from(grant.principal_id.clone())),
                ("capability", Value::from(grant.capability_name.clone())),
            ]),
        );
        Ok(grant)
    }

    /// Revoke a grant. Terminal and idempotent; revocation always wins at
    /// the next re-validation point.
    pub fn revoke_grant(
        &self,
        grant_id: &str,
        revoked_by_principal: &str,
        reason: RevocationReason,
    ) -> RevocationEvent {
        let event = self
            .authority
            .revoke(grant_id, revoked_by_principal, reason, self.clock.now());
        self.observers.emit(
            "grant_revoked",
            details([
                ("grant_id", Value::from(grant_id)),
                ("revoked_by", Value::from(revoked_by_principal)),
            ]),
        );
        event
    }

    // -------------------------------------------------------------------------
    // Observation and read surfaces
    // -------------------------------------------------------------------------

    /// Register a passive observer.
    pub fn register_observer(&self, observer: Box<dyn Observer>) -> SubscriberId {
        self.observers.register(observer)
    }

    /// Unregister an observer, flushing its backlog.
    pub fn unregister_observer(&self, id: SubscriberId) -> bool {
        self.observers.unregister(id)
    }

    /// Current global authority version.
    #[must_use]
    pub fn authority_version(&self) -> u64 {
        self.authority.authority_version()
    }

    /// Remaining bounded uses of a grant, if it exists and is bounded.
    #[must_use]
    pub fn grant_remaining_uses(&self, grant_id: &str) -> Option<i64> {
        self.authority.grant(grant_id).and_then(|g| g.remaining_uses())
    }

    /// Fetch a snapshot by id.
    #[must_use]
    pub fn snapshot(&self, snapshot_id: &str) -> Option<Snapshot> {
        self.snapshots.get(snapshot_id)
    }

    /// List snapshots, most recent first.
    #[must_use]
    pub fn list_snapshots(
        &self,
        principal_id: Option<&str>,
        capability_name: Option<&str>,
    ) -> Vec<Snapshot> {
        self.snapshots
            .list(principal_id, capability_name, self.config.snapshot_list_limit)
    }

    /// Statistics over stored snapshots.
    #[must_use]
    pub fn snapshot_statistics(&self) -> SnapshotStats {
        self.snapshots.statistics()
    }

    /// Fetch a sealed evidence bundle.
    #[must_use]
    pub fn evidence_bundle(&self, bundle_id: &str) -> Option<Arc<EvidenceBundle>> {
        self.evidence.get(bundle_id)
    }

    /// Export one evidence bundle as canonical bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError`] for an unknown bundle or serialization
    /// failure.
    pub fn export_evidence(&self, bundle_id: &str) -> Result<Vec<u8>, ExportError> {
        self.evidence.export(bundle_id)
    }

    /// Export every evidence bundle keyed by id.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError`] on serialization failure.
    pub fn export_all_evidence(&self) -> Result<Vec<u8>, ExportError> {
        self.evidence.export_all()
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    // -------------------------------------------------------------------------
    // The admission pipeline
    // -------------------------------------------------------------------------

    /// Admit and execute one invocation. The only execution path.
    pub fn execute(&self, capability_name: &str, draft: ContextDraft) -> ExecutionReport {
        let run_id = format!("RUN-{}", uuid::Uuid::new_v4());
        let mut trace = Trace {
            draft,
            grant: None,
            snapshot: None,
        };

        let outcome = if IN_EXECUTION.with(Cell::get) {
            Err(self
                .fail(
                    Phase::Mek0,
                    FailureType::CapabilitySelfInvocation,
                    TriggerCondition::SelfInvocation,
                )
                .with_invariant(Invariant::UnifiedExecutionAuthority)
                .with_authority(AuthorityContext::principal(trace.draft.principal_id.clone())))
        } else {
            self.admit(capability_name, &mut trace)
        };

        self.seal(&run_id, capability_name, &trace, outcome)
    }

    fn admit(&self, capability_name: &str, trace: &mut Trace) -> Result<Value, FailureEvent> {
        let now = self.clock.now();
        let principal_id = trace.draft.principal_id.clone();

        // Step 1 — context validity.
        let context = Context::freeze(trace.draft.clone(), now, &self.config)
            .map_err(|violation| self.context_failure(violation, &principal_id))?;

        // Step 2 — intent declaration.
        let Some(contract) = self.capabilities.get(capability_name) else {
            return Err(self
                .fail(
                    Phase::Mek0,
                    FailureType::UnknownCapability,
                    TriggerCondition::CapabilityUnknown,
                )
                .with_authority(AuthorityContext::principal(principal_id)));
        };
        if context.intent_name() != contract.name() {
            return Err(self
                .fail(
                    Phase::Mek0,
                    FailureType::InvalidIntent,
                    TriggerCondition::IntentCapabilityMismatch,
                )
                .with_authority(AuthorityContext::principal(principal_id)));
        }
        let declared = contract.required_context_fields();
        if declared.iter().any(|field| !context.fields().contains_key(field)) {
            return Err(self
                .fail(
                    Phase::Mek0,
                    FailureType::MissingContext,
                    TriggerCondition::MissingContextField,
                )
                .with_authority(AuthorityContext::principal(principal_id)));
        }
        if context.fields().keys().any(|key| !declared.contains(key)) {
            return Err(self
                .fail(
                    Phase::Mek0,
                    FailureType::InvalidIntent,
                    TriggerCondition::UnexpectedContextField,
                )
                .with_authority(AuthorityContext::principal(principal_id)));
        }
        let intent = Intent::of(&context);

        // Step 3 — principal presence.
        if context.principal_id().is_empty() {
            return Err(self.fail(
                Phase::Mek2,
                FailureType::MissingPrincipal,
                TriggerCondition::PrincipalMissing,
            ));
        }

        // Step 4 — grant existence.
        let Some(grant) = self
            .authority
            .lookup(context.principal_id(), capability_name, now)
        else {
            return Err(self
                .fail(
                    Phase::Mek2,
                    FailureType::MissingGrant,
                    TriggerCondition::GrantMissing,
                )
                .with_authority(AuthorityContext::principal(principal_id)));
        };
        trace.grant = Some(grant.clone());
        let subject = AuthorityContext::subject(principal_id, grant.grant_id.clone());
        if !grant.scope.is_object() {
            return Err(self
                .fail(
                    Phase::Mek2,
                    FailureType::InvalidGrantScope,
                    TriggerCondition::GrantScopeMalformed,
                )
                .with_authority(subject));
        }

        // Step 5 — not expired.
        if grant.is_expired(self.clock.now()) {
            return Err(self
                .fail(
                    Phase::Mek2,
                    FailureType::ExpiredGrant,
                    TriggerCondition::GrantExpired,
                )
                .with_authority(subject));
        }

        // Step 6 — not revoked.
        if self.authority.is_revoked(&grant.grant_id) {
            return Err(self
                .fail(
                    Phase::Mek2,
                    FailureType::RevokedGrant,
                    TriggerCondition::GrantRevoked,
                )
                .with_authority(subject));
        }

        // Step 7 — remaining uses, reserved atomically. A reservation is
        // never refunded: refused admissions past this point still spent
        // the use they reserved.
        let remaining = match self.authority.consume(&grant.grant_id) {
            Ok(remaining) => remaining,
            Err(AuthorityError::ExhaustedGrant { .. }) => {
                return Err(self
                    .fail(
                        Phase::Mek2,
                        FailureType::ExhaustedGrant,
                        TriggerCondition::GrantExhausted,
                    )
                    .with_authority(subject));
            }
            Err(_) => {
                return Err(self
                    .fail(
                        Phase::Mek2,
                        FailureType::MissingGrant,
                        TriggerCondition::GrantMissing,
                    )
                    .with_authority(subject));
            }
        };

        // Step 8 — confidence gate.
        if let Some(floor) = contract.consequence().confidence_floor() {
            if context.confidence() < floor {
                return Err(self
                    .fail(
                        Phase::Mek0,
                        FailureType::ConfidenceThresholdExceeded,
                        TriggerCondition::ConfidenceBelowThreshold,
                    )
                    .with_invariant(Invariant::ConfidenceBeforeAction)
                    .with_authority(subject));
            }
        }

        // Step 9 — snapshot capture.
        let scope_hash = contract.scope_hash().map_err(|_| {
            self.fail(
                Phase::Mek3,
                FailureType::InvalidContext,
                TriggerCondition::CanonicalEncodingFailed,
            )
            .with_authority(subject.clone())
        })?;
        let snapshot = Snapshot::capture(
            &context,
            &intent,
            &grant,
            scope_hash,
            self.authority.authority_version(),
            self.clock.now(),
            remaining,
        )
        .map_err(|_| {
            self.fail(
                Phase::Mek3,
                FailureType::InvalidContext,
                TriggerCondition::CanonicalEncodingFailed,
            )
            .with_authority(subject.clone())
        })?;
        if let Err(SnapshotError::ReuseAttempt { snapshot_id }) =
            self.snapshots.insert(snapshot.clone())
        {
            return Err(self
                .fail(
                    Phase::Mek3,
                    FailureType::SnapshotReuseAttempt,
                    TriggerCondition::SnapshotIdReused,
                )
                .with_authority(subject)
                .with_snapshot(snapshot_id));
        }
        trace.snapshot = Some(snapshot.clone());

        // Step 10 — friction. Blocking; revocations landing during the
        // wait are observed at step 11, not mid-sleep.
        FrictionParams::new(contract.consequence(), context.confidence()).wait(self.clock());

        // Step 11 — snapshot re-validation.
        self.revalidate(&snapshot, &context, &intent, &grant, &subject)?;

        // Step 12 — execute through the one door.
        IN_EXECUTION.with(|flag| flag.set(true));
        let call = catch_unwind(AssertUnwindSafe(|| contract.invoke(&context)));
        IN_EXECUTION.with(|flag| flag.set(false));
        match call {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(CapabilityError::DirectExecution { capability })) => {
                // A capability reached for another contract's execute
                // surface instead of going through the guard.
                tracing::warn!(
                    capability = %capability_name,
                    target = %capability,
                    "direct execution attempt surfaced through an admission"
                );
                Err(self
                    .fail(
                        Phase::Mek0,
                        FailureType::DirectExecutionAttempt,
                        TriggerCondition::DirectExecutionAttempted,
                    )
                    .with_invariant(Invariant::UnifiedExecutionAuthority)
                    .with_authority(subject)
                    .with_snapshot(snapshot.snapshot_id))
            }
            Ok(Err(error)) => {
                tracing::debug!(capability = %capability_name, %error, "capability returned an error");
                Err(self
                    .fail(
                        Phase::Mek0,
                        FailureType::ExecutionError,
                        TriggerCondition::CapabilityError,
                    )
                    .with_authority(subject)
                    .with_snapshot(snapshot.snapshot_id))
            }
            Err(_) => {
                tracing::warn!(capability = %capability_name, "capability panicked");
                Err(self
                    .fail(
                        Phase::Mek0,
                        FailureType::ExecutionError,
                        TriggerCondition::CapabilityPanic,
                    )
                    .with_authority(subject)
                    .with_snapshot(snapshot.snapshot_id))
            }
        }
    }

    /// Step 11: recompute every snapshot-hashed input and the authority
    /// version; any drift refuses. When the authority store can attest the
    /// cause of a version drift (revocation, exhaustion) the refusal names
    /// it; otherwise the drift refuses as a TOCTOU violation.
    fn revalidate(
        &self,
        snapshot: &Snapshot,
        context: &Context,
        intent: &Intent,
        grant: &Grant,
        subject: &AuthorityContext,
    ) -> Result<(), FailureEvent> {
        if let Err(SnapshotError::ReuseAttempt { .. } | SnapshotError::NotFound { .. }) =
            self.snapshots.mark_validated(&snapshot.snapshot_id)
        {
            return Err(self
                .fail(
                    Phase::Mek3,
                    FailureType::SnapshotReuseAttempt,
                    TriggerCondition::SnapshotIdReused,
                )
                .with_authority(subject.clone())
                .with_snapshot(snapshot.snapshot_id.clone()));
        }

        let recompute_failure = || {
            self.fail(
                Phase::Mek3,
                FailureType::SnapshotHashMismatch,
                TriggerCondition::CanonicalEncodingFailed,
            )
            .with_authority(subject.clone())
            .with_snapshot(snapshot.snapshot_id.clone())
        };
        let context_hash = snapshot::hash_context(context).map_err(|_| recompute_failure())?;
        if context_hash != snapshot.context_hash {
            return Err(self
                .fail(
                    Phase::Mek3,
                    FailureType::SnapshotHashMismatch,
                    TriggerCondition::ContextHashChanged,
                )
                .with_authority(subject.clone())
                .with_snapshot(snapshot.snapshot_id.clone()));
        }
        let intent_hash = snapshot::hash_intent(intent).map_err(|_| recompute_failure())?;
        if intent_hash != snapshot.intent_hash {
            return Err(self
                .fail(
                    Phase::Mek3,
                    FailureType::SnapshotHashMismatch,
                    TriggerCondition::IntentHashChanged,
                )
                .with_authority(subject.clone())
                .with_snapshot(snapshot.snapshot_id.clone()));
        }

        if self.authority.authority_version() != snapshot.authority_version {
            if self.authority.is_revoked(&grant.grant_id) {
                return Err(self
                    .fail(
                        Phase::Mek3,
                        FailureType::RevokedGrant,
                        TriggerCondition::GrantRevoked,
                    )
                    .with_authority(subject.clone())
                    .with_snapshot(snapshot.snapshot_id.clone()));
            }
            if self.grant_remaining_uses(&grant.grant_id) == Some(0) {
                return Err(self
                    .fail(
                        Phase::Mek3,
                        FailureType::ExhaustedGrant,
                        TriggerCondition::GrantExhausted,
                    )
                    .with_authority(subject.clone())
                    .with_snapshot(snapshot.snapshot_id.clone()));
            }
            return Err(self
                .fail(
                    Phase::Mek3,
                    FailureType::ToctouViolation,
                    TriggerCondition::AuthorityVersionChanged,
                )
                .with_authority(subject.clone())
                .with_snapshot(snapshot.snapshot_id.clone()));
        }

        // The grant may have died of old age during friction.
        if grant.is_expired(self.clock.now()) {
            return Err(self
                .fail(
                    Phase::Mek3,
                    FailureType::ExpiredGrant,
                    TriggerCondition::GrantExpired,
                )
                .with_authority(subject.clone())
                .with_snapshot(snapshot.snapshot_id.clone()));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Sealing
    // -------------------------------------------------------------------------

    fn seal(
        &self,
        run_id: &str,
        capability_name: &str,
        trace: &Trace,
        outcome: Result<Value, FailureEvent>,
    ) -> ExecutionReport {
        let now = self.clock.now();
        let context_snapshot = ContextSnapshot {
            context_id: trace.draft.context_id.clone(),
            principal_id: trace.draft.principal_id.clone(),
            intent_name: trace.draft.intent_name.clone(),
            confidence: trace.draft.confidence,
            fields: trace.draft.fields.clone(),
            recorded_at: now,
        };
        let intent_snapshot = IntentSnapshot {
            intent_name: trace.draft.intent_name.clone(),
            capability_name: capability_name.to_string(),
            declared_at: now,
        };
        let principal_snapshot = PrincipalSnapshot {
            principal_id: trace.draft.principal_id.clone(),
            recorded_at: now,
        };
        let grant_snapshot = trace.grant.as_ref().map(GrantSnapshot::of);
        let execution_snapshots: Vec<Snapshot> = trace.snapshot.clone().into_iter().collect();

        let (bundle_outcome, result) = match outcome {
            Ok(data) => (
                BundleOutcome::Results(vec![data.clone()]),
                ExecutionResult::Success { data },
            ),
            Err(event) => {
                let failure = FailureResult::single(run_id, event);
                (
                    BundleOutcome::Failure(failure.composition.clone()),
                    ExecutionResult::Refusal { failure },
                )
            }
        };

        let sealed = EvidenceBundle::seal(
            now,
            context_snapshot,
            intent_snapshot,
            principal_snapshot,
            grant_snapshot,
            execution_snapshots,
            bundle_outcome,
            self.authority.authority_version(),
        );
        let bundle_id = match sealed {
            Ok(bundle) => self.evidence.store(bundle).bundle_id.clone(),
            Err(error) => {
                // Evidence construction failure is itself a terminal
                // failure of the bundling phase; seal a minimal bundle
                // recording it.
                tracing::warn!(%error, "evidence bundle could not be sealed");
                let event = self.fail(
                    Phase::Mek6,
                    FailureType::ExecutionError,
                    TriggerCondition::BundleSealFailed,
                );
                let failure = FailureResult::single(run_id, event);
                let minimal = EvidenceBundle::seal(
                    now,
                    ContextSnapshot {
                        context_id: trace.draft.context_id.clone(),
                        principal_id: trace.draft.principal_id.clone(),
                        intent_name: trace.draft.intent_name.clone(),
                        confidence: trace.draft.confidence,
                        fields: std::collections::BTreeMap::new(),
                        recorded_at: now,
                    },
                    IntentSnapshot {
                        intent_name: trace.draft.intent_name.clone(),
                        capability_name: capability_name.to_string(),
                        declared_at: now,
                    },
                    PrincipalSnapshot {
                        principal_id: trace.draft.principal_id.clone(),
                        recorded_at: now,
                    },
                    None,
                    Vec::new(),
                    BundleOutcome::Failure(failure.composition.clone()),
                    self.authority.authority_version(),
                );
                let bundle_id = match minimal {
                    Ok(bundle) => self.evidence.store(bundle).bundle_id.clone(),
                    Err(_) => format!("BDL-unsealed-{}", uuid::Uuid::new_v4()),
                };
                self.observers.emit(
                    "execution_refused",
                    details([
                        ("capability", Value::from(capability_name)),
                        ("context_id", Value::from(trace.draft.context_id.clone())),
                        (
                            "failure_type",
                            Value::from(FailureType::ExecutionError.as_str()),
                        ),
                        ("bundle_id", Value::from(bundle_id.clone())),
                    ]),
                );
                return ExecutionReport {
                    bundle_id,
                    result: ExecutionResult::Refusal { failure },
                };
            }
        };

        match &result {
            ExecutionResult::Success { .. } => {
                self.observers.emit(
                    "execution_succeeded",
                    details([
                        ("capability", Value::from(capability_name)),
                        ("context_id", Value::from(trace.draft.context_id.clone())),
                        ("bundle_id", Value::from(bundle_id.clone())),
                    ]),
                );
            }
            ExecutionResult::Refusal { failure } => {
                let failure_type = failure
                    .first()
                    .map_or("unknown", |event| event.failure_type.as_str());
                let condition = failure
                    .first()
                    .map_or("unknown", |event| event.triggering_condition.as_str());
                tracing::debug!(
                    capability = %capability_name,
                    failure_type,
                    condition,
                    "admission refused"
                );
                self.observers.emit(
                    "execution_refused",
                    details([
                        ("capability", Value::from(capability_name)),
                        ("context_id", Value::from(trace.draft.context_id.clone())),
                        ("failure_type", Value::from(failure_type)),
                        ("triggering_condition", Value::from(condition)),
                        ("bundle_id", Value::from(bundle_id.clone())),
                    ]),
                );
            }
        }

        ExecutionReport { bundle_id, result }
    }

    // -------------------------------------------------------------------------
    // Failure construction
    // -------------------------------------------------------------------------

    fn fail(
        &self,
        phase: Phase,
        failure_type: FailureType,
        condition: TriggerCondition,
    ) -> FailureEvent {
        FailureEvent::new(phase, failure_type, condition, self.clock.now())
    }

    fn context_failure(&self, violation: ContextViolation, principal_id: &str) -> FailureEvent {
        let (failure_type, condition, invariant) = match violation {
            ContextViolation::MalformedContextId => (
                FailureType::InvalidContext,
                TriggerCondition::ContextIdMalformed,
                None,
            ),
            ContextViolation::MissingIntent => (
                FailureType::MissingIntent,
                TriggerCondition::IntentMissing,
                None,
            ),
            ContextViolation::MissingConfidence => (
                FailureType::MissingConfidence,
                TriggerCondition::ConfidenceMissing,
                Some(Invariant::ConfidenceBeforeAction),
            ),
            ContextViolation::InvalidConfidence => (
                FailureType::InvalidConfidence,
                TriggerCondition::ConfidenceOutOfRange,
                Some(Invariant::ConfidenceBeforeAction),
            ),
            ContextViolation::TooManyFields => (
                FailureType::InvalidContext,
                TriggerCondition::UnexpectedContextField,
                None,
            ),
        };
        let mut event = self.fail(Phase::Mek0, failure_type, condition);
        if let Some(invariant) = invariant {
            event = event.with_invariant(invariant);
        }
        if !principal_id.is_empty() {
            event = event.with_authority(AuthorityContext::principal(principal_id));
        }
        event
    }
}

fn ticks(duration: Duration) -> Tick {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
