//! Bounded multicast notifications.
//!
//! A [`Publisher`] fans a value out to every registered recipient with
//! `try_send`. Publishing never waits: when a recipient's buffer is full the
//! event is dropped for that recipient and counted. Recipients are expected
//! to be moderately buffered (see [`channel`]) so that drops stay rare.
//!
//! Two usage patterns share the primitive:
//!
//! - `Publisher<()>`: "something changed, re-read state". A dropped
//!   notification is harmless as long as the recipient already has one
//!   pending.
//! - `Publisher<T>` with a payload (chat messages): the value *is* the
//!   event, so a drop is lost delivery. That is an accepted limitation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

/// Buffer size used by [`channel`].
pub const DEFAULT_BUFFER: usize = 50;

/// Creates a recipient channel with [`DEFAULT_BUFFER`] slots.
pub fn channel<T>() -> (mpsc::Sender<T>, mpsc::Receiver<T>) {
    mpsc::channel(DEFAULT_BUFFER)
}

/// What happens to a recipient that cannot take an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Drop the event for that recipient and keep it registered.
    #[default]
    Drop,
    /// Drop the event; recipients whose receiver is gone are also removed
    /// after the fan-out pass. Full but live recipients stay registered.
    Evict,
}

/// Outcome of a single [`Publisher::notify`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub dropped: usize,
}

/// A set of recipients notified without blocking the publisher.
pub struct Publisher<T> {
    recipients: RwLock<Vec<mpsc::Sender<T>>>,
    policy: OverflowPolicy,
    dropped: AtomicU64,
}

impl<T> Default for Publisher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Publisher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("recipients", &self.len())
            .field("policy", &self.policy)
            .field("dropped", &self.dropped_total())
            .finish()
    }
}

impl<T> Publisher<T> {
    /// Creates a publisher with [`OverflowPolicy::Drop`].
    pub fn new() -> Self {
        Self::with_policy(OverflowPolicy::Drop)
    }

    pub fn with_policy(policy: OverflowPolicy) -> Self {
        Self {
            recipients: RwLock::new(Vec::new()),
            policy,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Registers a recipient. The same channel may be registered twice.
    pub fn subscribe(&self, recipient: mpsc::Sender<T>) {
        self.recipients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(recipient);
    }

    /// Removes the first registration of `recipient`.
    ///
    /// Returns `false` if the channel was not registered.
    pub fn unsubscribe(&self, recipient: &mpsc::Sender<T>) -> bool {
        let mut recipients = self
            .recipients
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match recipients.iter().position(|r| r.same_channel(recipient)) {
            Some(index) => {
                recipients.remove(index);
                true
            }
            None => false,
        }
    }

    /// Snapshot of the registered recipients.
    pub fn recipients(&self) -> Vec<mpsc::Sender<T>> {
        self.recipients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.recipients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events dropped over the publisher's lifetime.
    pub fn dropped_total(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<T: Clone> Publisher<T> {
    /// Sends `value` to every recipient without waiting.
    pub fn notify(&self, value: T) -> Delivery {
        let mut delivery = Delivery::default();
        let mut closed = false;
        {
            let recipients = self
                .recipients
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            for recipient in recipients.iter() {
                match recipient.try_send(value.clone()) {
                    Ok(()) => delivery.delivered += 1,
                    Err(TrySendError::Full(_)) => delivery.dropped += 1,
                    Err(TrySendError::Closed(_)) => {
                        delivery.dropped += 1;
                        closed = true;
                    }
                }
            }
        }

        if delivery.dropped > 0 {
            self.dropped
                .fetch_add(delivery.dropped as u64, Ordering::Relaxed);
            trace!(dropped = delivery.dropped, "notification dropped for busy recipients");
        }
        if closed && self.policy == OverflowPolicy::Evict {
            self.recipients
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|r| !r.is_closed());
        }
        delivery
    }
}
