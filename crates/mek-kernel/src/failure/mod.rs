//! Failure as first-class structured data.
//!
//! Every refusal anywhere in the kernel is a [`FailureEvent`]: a closed
//! [`FailureType`], a closed [`TriggerCondition`] vocabulary token, the
//! phase that refused, and the authority context that was in play. There is
//! no free text, no severity ranking, no remediation advice. A refusal is
//! a fact, not a conversation.
//!
//! # Closed taxonomies
//!
//! [`FailureType`], [`TriggerCondition`], [`Invariant`] and [`Phase`] are
//! closed sum types: a new failure kind cannot exist without editing the
//! type definition. Unknown states have no representation and therefore no
//! "unknown -> allow" path.
//!
//! A few [`FailureType`] variants name misuses this kernel makes
//! structurally impossible rather than refusals it can currently produce
//! (an immutable context cannot be mutated, an undeclared intent cannot be
//! inferred). Those variants stay in the taxonomy — downstream tools and
//! non-kernel bindings match on the full identifier set — and each one's
//! doc comment says why no kernel code path constructs it.
//!
//! # Ordering
//!
//! A [`FailureComposition`] preserves literal occurrence order. Events are
//! never deduplicated, collapsed, reordered, or tagged with a root cause.

use serde::{Deserialize, Serialize};

use crate::clock::Tick;


// =============================================================================
// Phase
// =============================================================================

/// Kernel layer in which a refusal was detected.
///
/// Stable identifiers; downstream tools match on the serialized form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub enum Phase {
    /// Execution guard and base invariants.
    #[serde(rename = "mek_0")]
    Mek0,
    /// Principals, grants, revocation.
    #[serde(rename = "mek_2")]
    Mek2,
    /// Reality-binding snapshots.
    #[serde(rename = "mek_3")]
    Mek3,
    /// Mechanical composition.
    #[serde(rename = "mek_4")]
    Mek4,
    /// Failure subsystem itself.
    #[serde(rename = "mek_5")]
    Mek5,
    /// Evidence bundles.
    #[serde(rename = "mek_6")]
    Mek6,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Mek0 => "mek_0",
            Self::Mek2 => "mek_2",
            Self::Mek3 => "mek_3",
            Self::Mek4 => "mek_4",
            Self::Mek5 => "mek_5",
            Self::Mek6 => "mek_6",
        };
        f.write_str(label)
    }
}

// =============================================================================
// FailureType
// =============================================================================

/// Closed refusal taxonomy.
///
/// Each variant is a specific, deterministic reason for refusal. The
/// taxonomy is stable: new kinds are added as new variants, never by
/// redefining existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum FailureType {
    // ---- Context ----
    /// A context field required by the contract is absent.
    MissingContext,
    /// The context is malformed (bad id, non-canonical fields).
    InvalidContext,
    /// A mutation of a frozen context was attempted.
    ///
    /// No kernel path constructs this: a frozen [`crate::context::Context`]
    /// has no mutator to call. Kept for bindings that persist or relay
    /// kernel-shaped refusals.
    ContextImmutabilityViolation,

    // ---- Intent ----
    /// No intent was declared.
    MissingIntent,
    /// The declared intent does not match the contract exactly.
    InvalidIntent,
    /// Something tried to infer an intent instead of declaring one.
    ///
    /// No kernel path constructs this: nothing in the admission pipeline
    /// infers, and the inference surface itself refuses before any
    /// admission exists ([`crate::negative::infer_intent`]).
    IntentInferenceAttempt,

    // ---- Confidence ----
    /// Confidence was not supplied.
    MissingConfidence,
    /// Confidence is outside `[0, 1]` or not a finite number.
    InvalidConfidence,
    /// Confidence is below the consequence-level floor.
    ConfidenceThresholdExceeded,

    // ---- Principal ----
    /// No principal was supplied.
    MissingPrincipal,
    /// The principal is not known to the authority store.
    ///
    /// No kernel path constructs this: principals are opaque and
    /// unregistered, so an unknown principal is indistinguishable from a
    /// grantless one and refuses as [`Self::MissingGrant`].
    UnknownPrincipal,

    // ---- Grant ----
    /// No grant exists for (principal, capability).
    MissingGrant,
    /// The grant's expiry tick has passed.
    ExpiredGrant,
    /// The grant has been revoked.
    RevokedGrant,
    /// The grant's bounded uses are exhausted.
    ExhaustedGrant,
    /// The grant's scope is malformed.
    InvalidGrantScope,

    // ---- Capability ----
    /// The capability name resolves to no registered contract.
    UnknownCapability,
    /// A capability invoked the guard from inside its own execution.
    CapabilitySelfInvocation,
    /// Re-registration with a differing contract definition.
    CapabilityRedefinition,

    // ---- Authority ----
    /// An execution path other than the guard was attempted.
    ///
    /// The two bypass shapes this kernel can detect refuse with their
    /// specific variants ([`Self::CapabilitySelfInvocation`],
    /// [`Self::DirectExecutionAttempt`]); the umbrella variant is kept for
    /// external bindings, and the violated-invariant field carries the
    /// umbrella meaning on those events.
    UnifiedExecutionAuthorityViolation,
    /// A contract's execute surface was called directly.
    DirectExecutionAttempt,

    // ---- Friction ----
    /// The friction wait was tampered with.
    ///
    /// No kernel path constructs this: friction is computed and slept
    /// inside the pipeline with no client-reachable control to tamper
    /// with. Kept for external bindings that expose such a control.
    FrictionViolation,
    /// A contract's consequence level disagrees with its registration.
    ///
    /// No kernel path constructs this: a capability's consequence has a
    /// single source, its registered contract, and the mutation vector
    /// refuses at registration as [`Self::CapabilityRedefinition`].
    ConsequenceLevelMismatch,

    // ---- Snapshot ----
    /// Re-validation found a hash differing from capture.
    SnapshotHashMismatch,
    /// A snapshot id was stored or validated twice.
    SnapshotReuseAttempt,
    /// Authority state drifted between capture and re-validation.
    ToctouViolation,

    // ---- Composition ----
    /// A composition step was refused.
    ///
    /// Not constructed by the composition engine, which forwards the
    /// refusing step's own events verbatim instead of wrapping them. Kept
    /// for bindings that summarize composite halts.
    CompositionStepFailure,
    /// Step ordering is not the sequence 0,1,2,…
    CompositionOrderViolation,

    // ---- Execution ----
    /// The capability's private function returned an error or panicked.
    ExecutionError,
    /// Generic guard refusal, for conditions with no more specific
    /// entry (a nameless contract at registration, for example).
    GuardRefusal,
}

impl FailureType {
    /// Stable snake_case identifier.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingContext => "missing_context",
            Self::InvalidContext => "invalid_context",
            Self::ContextImmutabilityViolation => "context_immutability_violation",
            Self::MissingIntent => "missing_intent",
            Self::InvalidIntent => "invalid_intent",
            Self::IntentInferenceAttempt => "intent_inference_attempt",
            Self::MissingConfidence => "missing_confidence",
            Self::InvalidConfidence => "invalid_confidence",
            Self::ConfidenceThresholdExceeded => "confidence_threshold_exceeded",
            Self::MissingPrincipal => "missing_principal",
            Self::UnknownPrincipal => "unknown_principal",
            Self::MissingGrant => "missing_grant",
            Self::ExpiredGrant => "expired_grant",
            Self::RevokedGrant => "revoked_grant",
            Self::ExhaustedGrant => "exhausted_grant",
            Self::InvalidGrantScope => "invalid_grant_scope",
            Self::UnknownCapability => "unknown_capability",
            Self::CapabilitySelfInvocation => "capability_self_invocation",
            Self::CapabilityRedefinition => "capability_redefinition",
            Self::UnifiedExecutionAuthorityViolation => "unified_execution_authority_violation",
            Self::DirectExecutionAttempt => "direct_execution_attempt",
            Self::FrictionViolation => "friction_violation",
            Self::ConsequenceLevelMismatch => "consequence_level_mismatch",
            Self::SnapshotHashMismatch => "snapshot_hash_mismatch",
            Self::SnapshotReuseAttempt => "snapshot_reuse_attempt",
            Self::ToctouViolation => "toctou_violation",
            Self::CompositionStepFailure => "composition_step_failure",
            Self::CompositionOrderViolation => "composition_order_violation",
            Self::ExecutionError => "execution_error",
            Self::GuardRefusal => "guard_refusal",
        }
    }
}

impl std::fmt::Display for FailureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Invariant
// =============================================================================

/// The structural invariants a refusal can cite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Invariant {
    /// All execution flows through the guard.
    UnifiedExecutionAuthority,
    /// No action without a stated confidence.
    ConfidenceBeforeAction,
    /// Consequence demands a real, blocking delay.
    FrictionUnderConsequence,
    /// A refusal is terminal; nothing retries it.
    RefusalIsTerminal,
    /// Every non-action surfaces as structured data.
    NonActionMustSurface,
    /// Observation never controls execution.
    ObservationNeverControls,
    /// Prohibited behaviors are structurally absent.
    NegativeCapability,
}

impl std::fmt::Display for Invariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::UnifiedExecutionAuthority => "unified_execution_authority",
            Self::ConfidenceBeforeAction => "confidence_before_action",
            Self::FrictionUnderConsequence => "friction_under_consequence",
            Self::RefusalIsTerminal => "refusal_is_terminal",
            Self::NonActionMustSurface => "non_action_must_surface",
            Self::ObservationNeverControls => "observation_never_controls",
            Self::NegativeCapability => "negative_capability",
        };
        f.write_str(label)
    }
}

// =============================================================================
// TriggerCondition
// =============================================================================

/// Closed vocabulary of triggering conditions.
///
/// A refusal names the exact condition that tripped it with one of these
/// tokens, never free text, so no later layer can elaborate, soften, or
/// summarize what happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum TriggerCondition {
    /// Context id is empty or exceeds bounds.
    ContextIdMalformed,
    /// A contract-required context field is absent.
    MissingContextField,
    /// A context field not declared by the contract is present.
    UnexpectedContextField,
    /// Context fields could not be canonically encoded.
    CanonicalEncodingFailed,
    /// No confidence value supplied.
    ConfidenceMissing,
    /// Confidence outside `[0, 1]` or non-finite.
    ConfidenceOutOfRange,
    /// Confidence below the consequence floor.
    ConfidenceBelowThreshold,
    /// No intent name supplied.
    IntentMissing,
    /// Declared intent does not name the invoked capability.
    IntentCapabilityMismatch,
    /// Capability name resolves to no contract.
    CapabilityUnknown,
    /// Contract re-registered with a differing definition.
    CapabilityRedefined,
    /// Contract registered without a name.
    CapabilityNameEmpty,
    /// No principal supplied.
    PrincipalMissing,
    /// Principal id exceeds bounds.
    PrincipalMalformed,
    /// No grant for (principal, capability).
    GrantMissing,
    /// Grant expiry tick has passed.
    GrantExpired,
    /// Grant is revoked.
    GrantRevoked,
    /// Grant uses exhausted.
    GrantExhausted,
    /// Grant scope is not a canonical object.
    GrantScopeMalformed,
    /// Grant id already present at issuance.
    GrantDuplicate,
    /// Snapshot id stored or validated twice.
    SnapshotIdReused,
    /// Context hash changed between capture and re-validation.
    ContextHashChanged,
    /// Intent hash changed between capture and re-validation.
    IntentHashChanged,
    /// Authority version changed between capture and re-validation.
    AuthorityVersionChanged,
    /// Capability execution returned an error.
    CapabilityError,
    /// Capability execution panicked.
    CapabilityPanic,
    /// Guard invoked from inside a capability execution.
    SelfInvocation,
    /// Contract execute surface called outside the guard.
    DirectExecutionAttempted,
    /// Composition has no steps.
    CompositionEmpty,
    /// Step order field is not the sequence 0,1,2,…
    CompositionOrderGap,
    /// A composition step was refused.
    CompositionStepRefused,
    /// Evidence bundle could not be sealed.
    BundleSealFailed,
    /// A structurally prohibited operation was invoked.
    ProhibitedOperation,
}

impl TriggerCondition {
    /// Stable snake_case token.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ContextIdMalformed => "context_id_malformed",
            Self::MissingContextField => "missing_context_field",
            Self::UnexpectedContextField => "unexpected_context_field",
            Self::CanonicalEncodingFailed => "canonical_encoding_failed",
            Self::ConfidenceMissing => "confidence_missing",
            Self::ConfidenceOutOfRange => "confidence_out_of_range",
            Self::ConfidenceBelowThreshold => "confidence_below_threshold",
            Self::IntentMissing => "intent_missing",
            Self::IntentCapabilityMismatch => "intent_capability_mismatch",
            Self::CapabilityUnknown => "capability_unknown",
            Self::CapabilityRedefined => "capability_redefined",
            Self::CapabilityNameEmpty => "capability_name_empty",
            Self::PrincipalMissing => "principal_missing",
            Self::PrincipalMalformed => "principal_malformed",
            Self::GrantMissing => "grant_missing",
            Self::GrantExpired => "grant_expired",
            Self::GrantRevoked => "grant_revoked",
            Self::GrantExhausted => "grant_exhausted",
            Self::GrantScopeMalformed => "grant_scope_malformed",
            Self::GrantDuplicate => "grant_duplicate",
            Self::SnapshotIdReused => "snapshot_id_reused",
            Self::ContextHashChanged => "context_hash_changed",
            Self::IntentHashChanged => "intent_hash_changed",
            Self::AuthorityVersionChanged => "authority_version_changed",
            Self::CapabilityError => "capability_error",
            Self::CapabilityPanic => "capability_panic",
            Self::SelfInvocation => "self_invocation",
            Self::DirectExecutionAttempted => "direct_execution_attempted",
            Self::CompositionEmpty => "composition_empty",
            Self::CompositionOrderGap => "composition_order_gap",
            Self::CompositionStepRefused => "composition_step_refused",
            Self::BundleSealFailed => "bundle_seal_failed",
            Self::ProhibitedOperation => "prohibited_operation",
        }
    }
}

impl std::fmt::Display for TriggerCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// FailureEvent
// =============================================================================

/// Authority context recorded on a failure event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AuthorityContext {
    /// Principal in play, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal_id: Option<String>,

    /// Grant in play, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_id: Option<String>,
}

impl AuthorityContext {
    /// Context naming only a principal.
    #[must_use]
    pub fn principal(principal_id: impl Into<String>) -> Self {
        Self {
            principal_id: Some(principal_id.into()),
            grant_id: None,
        }
    }

    /// Context naming a principal and a grant.
    #[must_use]
    pub fn subject(principal_id: impl Into<String>, grant_id: impl Into<String>) -> Self {
        Self {
            principal_id: Some(principal_id.into()),
            grant_id: Some(grant_id.into()),
        }
    }
}

/// Immutable, structured, terminal refusal record.
///
/// Constructed once at the point of refusal; no field is ever edited
/// afterwards. There is deliberately no explanation field and no severity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FailureEvent {
    /// Unique identifier (`FEV-<uuid>`).
    pub failure_id: String,

    /// Kernel layer that refused.
    pub phase: Phase,

    /// Closed refusal taxonomy entry.
    pub failure_type: FailureType,

    /// Structural invariant cited, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violated_invariant: Option<Invariant>,

    /// Exact closed-vocabulary condition that tripped the refusal.
    pub triggering_condition: TriggerCondition,

    /// Authority context in play, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority_context: Option<AuthorityContext>,

    /// Snapshot in play, if one had been captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,

    /// Monotonic tick at which the refusal was detected.
    pub timestamp: Tick,
}

impl FailureEvent {
    /// Create a failure event with a fresh id.
    #[must_use]
    pub fn new(
        phase: Phase,
        failure_type: FailureType,
        triggering_condition: TriggerCondition,
        timestamp: Tick,
    ) -> Self {
        Self {
            failure_id: format!("FEV-{}", uuid::Uuid::new_v4()),
            phase,
            failure_type,
            violated_invariant: None,
            triggering_condition,
            authority_context: None,
            snapshot_id: None,
            timestamp,
        }
    }

    /// Attach the violated invariant.
    #[must_use]
    pub fn with_invariant(mut self, invariant: Invariant) -> Self {
        self.violated_invariant = Some(invariant);
        self
    }

    /// Attach authority context.
    #[must_use]
    pub fn with_authority(mut self, authority: AuthorityContext) -> Self {
        self.authority_context = Some(authority);
        self
    }

    /// Attach the snapshot in play.
    #[must_use]
    pub fn with_snapshot(mut self, snapshot_id: impl Into<String>) -> Self {
        self.snapshot_id = Some(snapshot_id.into());
        self
    }
}

impl std::fmt::Display for FailureEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "refused: {} ({})",
            self.failure_type, self.triggering_condition
        )
    }
}

impl std::error::Error for FailureEvent {}

// =============================================================================
// FailureComposition / FailureResult
// =============================================================================

/// Ordered, append-only list of failure events.
///
/// Order is literal occurrence order. Appending never touches prior events;
/// nothing removes, edits, deduplicates, or summarizes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FailureComposition {
    /// Identifier of the run this composition belongs to.
    pub composition_id: String,

    events: Vec<FailureEvent>,
}

impl FailureComposition {
    /// Create an empty composition for the given run.
    #[must_use]
    pub fn new(composition_id: impl Into<String>) -> Self {
        Self {
            composition_id: composition_id.into(),
            events: Vec::new(),
        }
    }

    /// Append an event, preserving occurrence order.
    pub fn push(&mut self, event: FailureEvent) {
        self.events.push(event);
    }

    /// The events, in occurrence order.
    #[must_use]
    pub fn events(&self) -> &[FailureEvent] {
        &self.events
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether no event has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Terminal refusal output of one run.
///
/// Mutually exclusive with success data at the type level: a result carries
/// either this or data, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FailureResult {
    /// The ordered refusals of this run.
    pub composition: FailureComposition,
}

impl FailureResult {
    /// Wrap a composition as a terminal result.
    #[must_use]
    pub fn new(composition: FailureComposition) -> Self {
        Self { composition }
    }

    /// Terminal result holding a single event.
    #[must_use]
    pub fn single(composition_id: impl Into<String>, event: FailureEvent) -> Self {
        let mut composition = FailureComposition::new(composition_id);
        composition.push(event);
        Self { composition }
    }

    /// The first refusal of the run.
    #[must_use]
    pub fn first(&self) -> Option<&FailureEvent> {
        self.composition.events().first()
    }

    /// Failure results are always terminal.
    #[must_use]
    pub fn terminal(&self) -> bool {
        true
    }
}
