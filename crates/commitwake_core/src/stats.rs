//! Notifier statistics.
//!
//! # Usage
//!
//! ```rust,ignore
//! let notifier = CommitNotifier::new(identity, || Ok(()))?;
//! notifier.notify_others();
//!
//! let stats = notifier.stats();
//! println!("Tokens written: {}", stats.tokens_written);
//! println!("Wake cycles: {}", stats.wake_cycles);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared between notifying threads and the listener.
///
/// All counters are atomic and monotonically increasing.
#[derive(Debug, Default)]
pub struct NotifierCounters {
    /// Tokens successfully written to the wake channel.
    tokens_written: AtomicU64,
    /// Tokens given up on (buffer full, transient I/O failure).
    tokens_dropped: AtomicU64,
    /// Drain cycles that invoked the wake callback.
    wake_cycles: AtomicU64,
    /// Callback invocations that returned an error or panicked.
    callback_failures: AtomicU64,
}

impl NotifierCounters {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_token_written(&self) {
        self.tokens_written.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_token_dropped(&self) {
        self.tokens_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_wake_cycle(&self) {
        self.wake_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_callback_failure(&self) {
        self.callback_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> NotifierStats {
        NotifierStats {
            tokens_written: self.tokens_written.load(Ordering::Relaxed),
            tokens_dropped: self.tokens_dropped.load(Ordering::Relaxed),
            wake_cycles: self.wake_cycles.load(Ordering::Relaxed),
            callback_failures: self.callback_failures.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of notifier statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NotifierStats {
    /// Tokens successfully written to the wake channel.
    pub tokens_written: u64,
    /// Tokens dropped instead of blocking the committing thread.
    pub tokens_dropped: u64,
    /// Drain cycles that invoked the wake callback.
    pub wake_cycles: u64,
    /// Callback invocations that returned an error or panicked.
    pub callback_failures: u64,
}
