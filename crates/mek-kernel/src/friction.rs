//! Deliberate friction under consequence.
//!
//! The delay is a pure function of consequence level and stated confidence.
//! No flag shortens it, no urgency bypasses it, nothing learns a better
//! value. The wait itself runs inside the admission pipeline between
//! snapshot capture and snapshot re-validation.

use std::time::Duration;

use crate::capability::Consequence;
use crate::clock::Clock;

/// Additional delay applied below the low-confidence line.
pub const LOW_CONFIDENCE_PENALTY: Duration = Duration::from_secs(5);

/// Confidence below this adds [`LOW_CONFIDENCE_PENALTY`].
pub const LOW_CONFIDENCE_LINE: f64 = 0.6;

/// Deterministic friction parameters for one admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrictionParams {
    duration: Duration,
}

impl FrictionParams {
    /// Compute the friction for a consequence level and stated confidence.
    #[must_use]
    pub fn new(consequence: Consequence, confidence: f64) -> Self {
        let mut duration = consequence.friction_base();
        if confidence < LOW_CONFIDENCE_LINE {
            duration += LOW_CONFIDENCE_PENALTY;
        }
        Self { duration }
    }

    /// The computed delay.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Block for the computed delay.
    pub(crate) fn wait(&self, clock: &dyn Clock) {
        if !self.duration.is_zero() {
            clock.sleep(self.duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn base_table_follows_consequence() {
        assert_eq!(
            FrictionParams::new(Consequence::High, 0.9).duration(),
            Duration::from_secs(10)
        );
        assert_eq!(
            FrictionParams::new(Consequence::Medium, 0.9).duration(),
            Duration::from_secs(3)
        );
        assert_eq!(
            FrictionParams::new(Consequence::Low, 0.9).duration(),
            Duration::ZERO
        );
    }

    #[test]
    fn low_confidence_adds_penalty() {
        assert_eq!(
            FrictionParams::new(Consequence::High, 0.5).duration(),
            Duration::from_secs(15)
        );
        assert_eq!(
            FrictionParams::new(Consequence::Low, 0.1).duration(),
            Duration::from_secs(5)
        );
        // The line itself carries no penalty.
        assert_eq!(
            FrictionParams::new(Consequence::Medium, 0.6).duration(),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn wait_sleeps_for_the_computed_duration() {
        let clock = ManualClock::new();
        FrictionParams::new(Consequence::Medium, 0.9).wait(&clock);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(3)]);
    }

    #[test]
    fn zero_friction_never_touches_the_clock() {
        let clock = ManualClock::new();
        FrictionParams::new(Consequence::Low, 0.9).wait(&clock);
        assert!(clock.sleeps().is_empty());
    }
}
