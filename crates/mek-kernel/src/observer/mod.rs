//! Passive observation.
//!
//! Observers watch; they never control. The hub realizes that property by
//! construction: each registered observer gets a bounded channel and a
//! dedicated drain thread. Emission is a non-blocking `try_send`: a slow
//! observer loses events, a panicking observer is swallowed inside its own
//! thread, and a missing observer changes nothing. No admission outcome
//! depends on any observer's existence or behavior.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{SyncSender, TrySendError, sync_channel};
use std::thread::JoinHandle;

use serde_json::{Map, Value};


/// One event offered to observers: a type tag plus an opaque detail map.
#[derive(Debug, Clone, PartialEq)]
pub struct ObserverEvent {
    /// Event type tag (for example `execution_succeeded`).
    pub event_type: String,
    /// Opaque details. Observers may read them and nothing else.
    pub details: Map<String, Value>,
}

impl ObserverEvent {
    /// Build an event from a type tag and detail pairs.
    #[must_use]
    pub fn new(event_type: impl Into<String>, details: Map<String, Value>) -> Self {
        Self {
            event_type: event_type.into(),
            details,
        }
    }
}

/// A passive subscriber.
///
/// Implementations must not assume delivery: events are dropped when the
/// subscriber's channel is full, and delivery order across subscribers is
/// not a guarantee. Panics are swallowed.
pub trait Observer: Send + 'static {
    /// Receive one event. Must not affect control flow anywhere.
    fn on_event(&mut self, event: &ObserverEvent);
}

/// Handle identifying a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

struct Subscriber {
    id: u64,
    sender: SyncSender<ObserverEvent>,
    handle: Option<JoinHandle<()>>,
}

/// Fan-out hub for passive subscribers.
pub struct ObserverHub {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
    channel_capacity: usize,
}

impl ObserverHub {
    /// Create a hub whose per-observer channels hold `channel_capacity`
    /// undelivered events.
    #[must_use]
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Register an observer, spawning its drain thread.
    pub fn register(&self, mut observer: Box<dyn Observer>) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = sync_channel::<ObserverEvent>(self.channel_capacity);
        let handle = std::thread::Builder::new()
            .name(format!("mek-observer-{id}"))
            .spawn(move || {
                while let Ok(event) = receiver.recv() {
                    // A panicking observer loses this event and nothing else.
                    let _ = catch_unwind(AssertUnwindSafe(|| observer.on_event(&event)));
                }
            })
            .expect("spawn observer drain thread");
        self.lock_subscribers().push(Subscriber {
            id,
            sender,
            handle: Some(handle),
        });
        SubscriberId(id)
    }

    /// Unregister an observer.
    ///
    /// Drops the channel and joins the drain thread, so every event already
    /// enqueued is delivered before this returns. Returns `false` for an
    /// unknown id.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let subscriber = {
            let mut subscribers = self.lock_subscribers();
            let position = subscribers.iter().position(|s| s.id == id.0);
            position.map(|index| subscribers.swap_remove(index))
        };
        let Some(mut subscriber) = subscriber else {
            return false;
        };
        drop(subscriber.sender);
        if let Some(handle) = subscriber.handle.take() {
            let _ = handle.join();
        }
        true
    }

    /// Offer an event to every subscriber without blocking.
    pub fn emit(&self, event_type: &str, details: Map<String, Value>) {
        let event = ObserverEvent::new(event_type, details);
        let subscribers = self.lock_subscribers();
        for subscriber in subscribers.iter() {
            match subscriber.sender.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(
                        subscriber = subscriber.id,
                        event_type = %event.event_type,
                        "observer backlog full, event dropped"
                    );
                }
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock_subscribers().len()
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Drop for ObserverHub {
    fn drop(&mut self) {
        let mut subscribers = self.lock_subscribers();
        for subscriber in subscribers.iter_mut() {
            // Closing the channel ends the drain loop; detached threads
            // finish delivering their backlog on their own time.
            subscriber.handle.take();
        }
        subscribers.clear();
    }
}

impl std::fmt::Debug for ObserverHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverHub")
            .field("subscribers", &self.subscriber_count())
            .field("channel_capacity", &self.channel_capacity)
            .finish()
    }
}

/// Convenience for building detail maps.
pub(crate) fn details<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
