//! Wake feed for observing cross-process commits.
//!
//! A [`WakeFeed`] turns wake callbacks into something other threads can wait
//! on. Each drain cycle advances the feed's epoch by one and sends a
//! [`WakeEvent`] to every subscriber.
//!
//! # Usage
//!
//! ```rust
//! use commitwake_core::WakeFeed;
//! use std::time::Duration;
//!
//! let feed = WakeFeed::new();
//! let receiver = feed.subscribe();
//!
//! feed.record_wake();
//!
//! let event = receiver.recv_timeout(Duration::from_millis(100)).unwrap();
//! assert_eq!(event.epoch, 1);
//! ```
//!
//! Epochs count wake cycles, not commits: several commits may share one
//! epoch.

use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

/// One wake cycle observed by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeEvent {
    /// Epoch reached by this wake (starts at 1).
    pub epoch: u64,
}

/// Distributes wake cycles to subscribers.
///
/// The feed:
/// - Counts wake cycles in a monotonically increasing epoch
/// - Supports multiple subscribers
/// - Lets threads block until the epoch moves past a known value
/// - Is thread-safe
pub struct WakeFeed {
    /// Subscribers (senders).
    subscribers: RwLock<Vec<Sender<WakeEvent>>>,
    /// Current epoch.
    epoch: Mutex<u64>,
    /// Signalled whenever the epoch advances.
    advanced: Condvar,
}

impl WakeFeed {
    /// Creates a feed at epoch 0.
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            epoch: Mutex::new(0),
            advanced: Condvar::new(),
        }
    }

    /// Subscribes to the feed.
    ///
    /// Returns a receiver for every future wake event. The receiver should be
    /// drained regularly to avoid unbounded memory growth.
    pub fn subscribe(&self) -> Receiver<WakeEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Records one wake cycle and returns the new epoch.
    ///
    /// This is what a notifier's wake callback calls.
    pub fn record_wake(&self) -> u64 {
        let epoch = {
            let mut current = self.epoch.lock();
            *current += 1;
            *current
        };
        self.advanced.notify_all();

        let event = WakeEvent { epoch };
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event).is_ok());
        epoch
    }

    /// Returns the current epoch.
    pub fn epoch(&self) -> u64 {
        *self.epoch.lock()
    }

    /// Blocks until the epoch is greater than `epoch` or the timeout passes.
    ///
    /// Returns the new epoch, or `None` on timeout.
    pub fn wait_past(&self, epoch: u64, timeout: Duration) -> Option<u64> {
        let deadline = Instant::now() + timeout;
        let mut current = self.epoch.lock();
        while *current <= epoch {
            if self.advanced.wait_until(&mut current, deadline).timed_out() {
                break;
            }
        }
        (*current > epoch).then_some(*current)
    }

    /// Returns the number of connected subscribers.
    ///
    /// Disconnected subscribers are pruned on the next wake.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for WakeFeed {
    fn default() -> Self {
        Self::new()
    }
}
