//! Monotonic time for the kernel.
//!
//! Every timestamp in the kernel is a [`Tick`]: milliseconds of monotonic
//! time since the owning kernel instance was constructed. Wall-clock time
//! never enters the admission path — grants expire on monotonic ticks,
//! snapshots are captured at monotonic ticks, and friction is a monotonic
//! sleep.
//!
//! The [`Clock`] trait exists so the admission pipeline can be driven by
//! virtualized time in tests ([`ManualClock`]) without opening any bypass to
//! clients: the clock is fixed at kernel construction and is not reachable
//! from any client-facing call.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic kernel time in milliseconds since kernel construction.
pub type Tick = u64;

/// Source of monotonic time and blocking sleeps for one kernel instance.
pub trait Clock: Send + Sync {
    /// Current monotonic tick.
    fn now(&self) -> Tick;

    /// Block the calling thread for `duration`.
    ///
    /// This is the kernel's only suspension point (the friction gate).
    fn sleep(&self, duration: Duration);
}

/// Production clock backed by [`Instant`].
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Create a clock whose tick zero is "now".
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Tick {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Deterministic clock for tests and simulation.
///
/// Sleeping advances virtual time instead of blocking. Actions queued with
/// [`ManualClock::queue_sleep_action`] run at the start of the next sleep,
/// which lets a test inject external events (a revocation, a grant
/// consumption) "during" the friction wait.
pub struct ManualClock {
    now: AtomicU64,
    sleep_actions: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    slept: Mutex<Vec<Duration>>,
}

impl ManualClock {
    /// Create a manual clock at tick zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: AtomicU64::new(0),
            sleep_actions: Mutex::new(Vec::new()),
            slept: Mutex::new(Vec::new()),
        }
    }

    /// Advance virtual time without a sleep.
    pub fn advance(&self, duration: Duration) {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    /// Queue an action to run at the start of the next sleep.
    pub fn queue_sleep_action(&self, action: Box<dyn FnOnce() + Send>) {
        self.sleep_actions
            .lock()
            .expect("sleep action lock poisoned")
            .push(action);
    }

    /// Durations of every sleep observed so far, in order.
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.lock().expect("sleep log lock poisoned").clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualClock")
            .field("now", &self.now.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Tick {
        self.now.load(Ordering::SeqCst)
    }

    fn sleep(&self, duration: Duration) {
        let actions: Vec<_> = self
            .sleep_actions
            .lock()
            .expect("sleep action lock poisoned")
            .drain(..)
            .collect();
        for action in actions {
            action();
        }
        self.slept
            .lock()
            .expect("sleep log lock poisoned")
            .push(duration);
        self.advance(duration);
    }
}
