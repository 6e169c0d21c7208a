//! Mechanical step composition — no emergent authority.
//!
//! A [`Composition`] is an ordered list of steps, each a (capability,
//! context draft) pair. Every step is an independent admission through the
//! guard: fresh context, fresh intent, fresh snapshot, fresh authority
//! checks. Success of step N gives exactly nothing to step N+1.
//!
//! The only failure policy is STRICT: the first refused step halts the
//! composition, later steps are never attempted, and the composite failure
//! contains only the events of the halting step. No retries, no branching,
//! no aggregation, no partial-success exposure.

use serde_json::Value;
use thiserror::Error;

use crate::context::ContextDraft;
use crate::failure::{
    FailureComposition, FailureEvent, FailureResult, FailureType, Phase, TriggerCondition,
};
use crate::guard::{ExecutionResult, Guard};


/// Failure policy of a composition. STRICT is the only admissible value;
/// the type has no other inhabitant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// First refusal halts the composition.
    #[default]
    Strict,
}

/// One step: an independent (capability, context) admission.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionStep {
    /// Caller-chosen step identifier.
    pub step_id: String,
    /// Explicit position; must equal the step's index.
    pub order: u32,
    /// Capability to admit.
    pub capability_name: String,
    /// Context draft for this step and no other.
    pub draft: ContextDraft,
}

/// Errors detected when assembling a composition.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CompositionError {
    /// A composition needs at least one step.
    #[error("composition must have at least one step")]
    Empty,

    /// A step's order field does not equal its index.
    #[error("step order mismatch at index {index}: expected {index}, got {order}")]
    OrderMismatch {
        /// Index in the step list.
        index: usize,
        /// The order field found there.
        order: u32,
    },
}

/// An ordered list of independent admissions with STRICT halt semantics.
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    /// Unique composition identifier.
    pub composition_id: String,
    /// The steps, in declared order.
    pub steps: Vec<CompositionStep>,
    /// Halt policy; STRICT only.
    pub failure_policy: FailurePolicy,
}

impl Composition {
    /// Assemble a composition, validating the explicit step ordering.
    ///
    /// # Errors
    ///
    /// - [`CompositionError::Empty`] for zero steps.
    /// - [`CompositionError::OrderMismatch`] when order fields are not the
    ///   sequence 0,1,2,…
    pub fn new(
        composition_id: impl Into<String>,
        steps: Vec<CompositionStep>,
    ) -> Result<Self, CompositionError> {
        let composition = Self {
            composition_id: composition_id.into(),
            steps,
            failure_policy: FailurePolicy::Strict,
        };
        composition.check_order()?;
        Ok(composition)
    }

    fn check_order(&self) -> Result<(), CompositionError> {
        if self.steps.is_empty() {
            return Err(CompositionError::Empty);
        }
        for (index, step) in self.steps.iter().enumerate() {
            if step.order as usize != index {
                return Err(CompositionError::OrderMismatch {
                    index,
                    order: step.order,
                });
            }
        }
        Ok(())
    }
}

/// Result of one successfully admitted step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    /// The step's identifier.
    pub step_id: String,
    /// The step's position.
    pub order: u32,
    /// Evidence bundle sealed for the step's admission.
    pub bundle_id: String,
    /// The step's result data.
    pub data: Value,
}

/// Terminal outcome of a composition. Success and halt are mutually
/// exclusive at the type level.
#[derive(Debug, Clone, PartialEq)]
pub enum CompositionOutcome {
    /// Every step succeeded.
    Success {
        /// Per-step results in step order.
        steps: Vec<StepReport>,
        /// The last step's data.
        final_data: Value,
    },
    /// A step refused; the composition halted there.
    Halted {
        /// Steps that completed before the halt.
        completed: Vec<StepReport>,
        /// Identifier of the halting step, when a step was reached.
        halted_at_step: Option<String>,
        /// The composite failure: only events up to and including the halt.
        failure: FailureResult,
    },
}

/// What [`Guard::execute_composition`] returns.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionReport {
    /// The composition's identifier.
    pub composition_id: String,
    /// The terminal outcome.
    pub outcome: CompositionOutcome,
}

impl CompositionReport {
    /// Whether every step succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, CompositionOutcome::Success { .. })
    }
}

/// Run a composition step-by-step through the guard.
pub(crate) fn run(guard: &Guard, composition: &Composition) -> CompositionReport {
    let composition_id = composition.composition_id.clone();

    // The guard revalidates ordering even for hand-assembled compositions.
    if let Err(error) = composition.check_order() {
        let condition = match error {
            CompositionError::Empty => TriggerCondition::CompositionEmpty,
            CompositionError::OrderMismatch { .. } => TriggerCondition::CompositionOrderGap,
        };
        let event = FailureEvent::new(
            Phase::Mek4,
            FailureType::CompositionOrderViolation,
            condition,
            guard.clock().now(),
        );
        return CompositionReport {
            composition_id: composition_id.clone(),
            outcome: CompositionOutcome::Halted {
                completed: Vec::new(),
                halted_at_step: None,
                failure: FailureResult::single(composition_id, event),
            },
        };
    }

    let mut completed: Vec<StepReport> = Vec::with_capacity(composition.steps.len());
    for step in &composition.steps {
        let report = guard.execute(&step.capability_name, step.draft.clone());
        match report.result {
            ExecutionResult::Success { data } => {
                completed.push(StepReport {
                    step_id: step.step_id.clone(),
                    order: step.order,
                    bundle_id: report.bundle_id,
                    data,
                });
            }
            ExecutionResult::Refusal { failure } => {
                // STRICT halt: carry over the halting step's events, in
                // order, under the composition's id; later steps never run.
                let mut events = FailureComposition::new(composition_id.clone());
                for event in failure.composition.events() {
                    events.push(event.clone());
                }
                return CompositionReport {
                    composition_id,
                    outcome: CompositionOutcome::Halted {
                        completed,
                        halted_at_step: Some(step.step_id.clone()),
                        failure: FailureResult::new(events),
                    },
                };
            }
        }
    }

    let final_data = completed
        .last()
        .map(|step| step.data.clone())
        .unwrap_or(Value::Null);
    CompositionReport {
        composition_id,
        outcome: CompositionOutcome::Success {
            steps: completed,
            final_data,
        },
    }
}

impl Guard {
    /// Execute a composition: each step an independent admission, STRICT
    /// halt on the first refusal.
    #[must_use]
    pub fn execute_composition(&self, composition: &Composition) -> CompositionReport {
        run(self, composition)
    }
}
