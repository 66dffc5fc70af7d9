//! Database-level coordinator wiring a notifier to a wake feed.

use crate::channel::ChannelIdentity;
use crate::config::Config;
use crate::error::NotifyResult;
use crate::feed::{WakeEvent, WakeFeed};
use crate::notifier::CommitNotifier;
use crate::stats::NotifierStats;
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::warn;

/// Owns the commit notifier for one open database handle.
///
/// Commits made through this handle are announced with
/// [`commit_hook`](DatabaseWatcher::commit_hook); wakes from any handle on the
/// same database advance the watcher's [`WakeFeed`].
///
/// # Degraded mode
///
/// With [`Config::allow_degraded`] set, a watcher whose notifier cannot be
/// initialized still opens, without notification support. Commits are then
/// not announced and the feed never advances.
pub struct DatabaseWatcher {
    identity: ChannelIdentity,
    feed: Arc<WakeFeed>,
    notifier: Option<CommitNotifier>,
}

impl DatabaseWatcher {
    /// Opens a watcher for the database file at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid, or if the notifier cannot be
    /// initialized and degraded mode is not allowed.
    pub fn open(db_path: &Path, config: &Config) -> NotifyResult<Self> {
        let identity = ChannelIdentity::for_database(db_path, config)?;
        let feed = Arc::new(WakeFeed::new());

        let sink = Arc::clone(&feed);
        let notifier = match CommitNotifier::with_config(&identity, config, move || {
            sink.record_wake();
            Ok(())
        }) {
            Ok(notifier) => Some(notifier),
            Err(err) if config.allow_degraded && err.is_initialization() => {
                warn!(
                    path = %identity.primary().display(),
                    error = %err,
                    "commit notification unavailable; opening without it"
                );
                None
            }
            Err(err) => return Err(err),
        };

        Ok(Self {
            identity,
            feed,
            notifier,
        })
    }

    /// Announces a successful commit to every handle on this database.
    pub fn commit_hook(&self) {
        if let Some(notifier) = &self.notifier {
            notifier.notify_others();
        }
    }

    /// Subscribes to wake events.
    pub fn subscribe(&self) -> Receiver<WakeEvent> {
        self.feed.subscribe()
    }

    /// Returns the wake feed.
    #[must_use]
    pub fn feed(&self) -> &Arc<WakeFeed> {
        &self.feed
    }

    /// Returns the channel identity derived for this database.
    #[must_use]
    pub fn identity(&self) -> &ChannelIdentity {
        &self.identity
    }

    /// Returns true if the watcher opened without notification support.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.notifier.is_none()
    }

    /// Returns notifier statistics, or `None` in degraded mode.
    #[must_use]
    pub fn stats(&self) -> Option<NotifierStats> {
        self.notifier.as_ref().map(CommitNotifier::stats)
    }

    /// Stops the listener and releases the wake channel.
    pub fn close(mut self) {
        if let Some(notifier) = self.notifier.as_mut() {
            notifier.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotifyError;
    use std::fs::File;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn commit_advances_feed() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("app.db");
        File::create(&db_path).unwrap();

        let watcher = DatabaseWatcher::open(&db_path, &Config::default()).unwrap();
        assert!(!watcher.is_degraded());

        let epoch = watcher.feed().epoch();
        watcher.commit_hook();
        assert!(watcher
            .feed()
            .wait_past(epoch, Duration::from_secs(5))
            .is_some());

        watcher.close();
    }

    #[test]
    fn strict_mode_returns_error() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("app.db");
        File::create(temp.path().join("app.db.note")).unwrap();

        let result = DatabaseWatcher::open(&db_path, &Config::default());
        assert!(matches!(result, Err(NotifyError::NotAFifo { .. })));
    }

    #[test]
    fn degraded_mode_opens_without_notifier() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("app.db");
        File::create(temp.path().join("app.db.note")).unwrap();

        let watcher =
            DatabaseWatcher::open(&db_path, &Config::new().allow_degraded(true)).unwrap();
        assert!(watcher.is_degraded());
        assert!(watcher.stats().is_none());

        // Commits are silently not announced.
        watcher.commit_hook();
        assert_eq!(watcher.feed().epoch(), 0);
    }
}
