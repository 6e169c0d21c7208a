//! Per-invocation context and declared intent.
//!
//! Clients describe an invocation with a [`ContextDraft`]. The guard is the
//! only thing that turns a draft into a frozen [`Context`], and only after
//! the draft passes validity checks — a `Context` whose confidence is
//! missing or outside `[0, 1]` cannot exist. This split is what lets a bad
//! draft surface as a structured refusal instead of a construction panic.
//!
//! A frozen context has no mutator: one context, one intent, one admission
//! attempt, then it is dropped (its hashes persist inside snapshots and
//! evidence).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::Tick;
use crate::config::KernelConfig;

/// Unvalidated invocation input, as supplied by a client.
///
/// Nothing here is trusted; the guard validates every field before
/// freezing. `confidence` is optional *here* precisely so that its absence
/// can be refused rather than made unrepresentable at the call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContextDraft {
    /// Caller-chosen unique id for this invocation.
    pub context_id: String,

    /// Principal on whose authority the invocation runs.
    pub principal_id: String,

    /// Declared intent; must name the invoked capability.
    pub intent_name: String,

    /// Stated confidence in `[0, 1]`. Mandatory; there is no default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    /// Explicit fields, keys predeclared by the capability contract.
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl ContextDraft {
    /// Start a draft with a generated context id.
    #[must_use]
    pub fn new(intent_name: impl Into<String>, principal_id: impl Into<String>) -> Self {
        Self {
            context_id: format!("CTX-{}", uuid::Uuid::new_v4()),
            principal_id: principal_id.into(),
            intent_name: intent_name.into(),
            confidence: None,
            fields: BTreeMap::new(),
        }
    }

    /// Override the generated context id.
    #[must_use]
    pub fn with_context_id(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = context_id.into();
        self
    }

    /// State the confidence for this invocation.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Add an explicit field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Why a draft could not be frozen.
///
/// The guard maps each variant to the matching refusal taxonomy entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContextViolation {
    /// `context_id` empty or over the configured bound.
    MalformedContextId,
    /// `intent_name` empty.
    MissingIntent,
    /// No confidence supplied.
    MissingConfidence,
    /// Confidence non-finite or outside `[0, 1]`.
    InvalidConfidence,
    /// More explicit fields than the configured bound.
    TooManyFields,
}

/// Frozen, validated per-invocation context.
///
/// Immutable by construction: fields are private, accessors borrow, and no
/// mutator exists anywhere in the crate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Context {
    context_id: String,
    principal_id: String,
    intent_name: String,
    confidence: f64,
    fields: BTreeMap<String, Value>,
    created_at: Tick,
}

impl Context {
    /// Validate a draft and freeze it. Guard-internal.
    pub(crate) fn freeze(
        draft: ContextDraft,
        created_at: Tick,
        config: &KernelConfig,
    ) -> Result<Self, ContextViolation> {
        if draft.context_id.is_empty() || draft.context_id.len() > config.max_id_length {
            return Err(ContextViolation::MalformedContextId);
        }
        if draft.intent_name.is_empty() {
            return Err(ContextViolation::MissingIntent);
        }
        let Some(confidence) = draft.confidence else {
            return Err(ContextViolation::MissingConfidence);
        };
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(ContextViolation::InvalidConfidence);
        }
        if draft.fields.len() > config.max_context_fields {
            return Err(ContextViolation::TooManyFields);
        }
        Ok(Self {
            context_id: draft.context_id,
            principal_id: draft.principal_id,
            intent_name: draft.intent_name,
            confidence,
            fields: draft.fields,
            created_at,
        })
    }

    /// Unique id of this invocation.
    #[must_use]
    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    /// Principal on whose authority the invocation runs.
    #[must_use]
    pub fn principal_id(&self) -> &str {
        &self.principal_id
    }

    /// Declared intent name.
    #[must_use]
    pub fn intent_name(&self) -> &str {
        &self.intent_name
    }

    /// Stated confidence, guaranteed finite and in `[0, 1]`.
    #[must_use]
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Explicit fields, keys in sorted order.
    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Monotonic tick at which the draft was frozen.
    #[must_use]
    pub fn created_at(&self) -> Tick {
        self.created_at
    }
}

/// Declared intent: a name plus the immutable parameters the capability
/// will receive. One intent per context; nothing infers or ranks intents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Intent {
    name: String,
    parameters: BTreeMap<String, Value>,
}

impl Intent {
    /// The intent a frozen context declares.
    #[must_use]
    pub fn of(context: &Context) -> Self {
        Self {
            name: context.intent_name().to_string(),
            parameters: context.fields().clone(),
        }
    }

    /// Declared name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Immutable parameters.
    #[must_use]
    pub fn parameters(&self) -> &BTreeMap<String, Value> {
        &self.parameters
    }
}
