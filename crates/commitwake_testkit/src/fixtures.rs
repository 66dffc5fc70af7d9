//! Test fixtures and notifier helpers.
//!
//! Provides temporary database files, wake counters to observe callbacks,
//! and gates to hold a listener thread inside its callback.

use commitwake_core::{ChannelIdentity, Config, WakeError};
use parking_lot::{Condvar, Mutex};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// A database file in a temporary directory with automatic cleanup.
///
/// Each instance gets its own directory, so wake channels derived from
/// different fixtures never collide.
pub struct TempDatabase {
    /// Path to the (empty) database file.
    db_path: PathBuf,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: TempDir,
}

impl TempDatabase {
    /// Creates `test.db` in a fresh temporary directory.
    pub fn new() -> Self {
        Self::named("test.db")
    }

    /// Creates a database file with the given name in a fresh temporary directory.
    pub fn named(name: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join(name);
        File::create(&db_path).expect("Failed to create database file");

        Self {
            db_path,
            _temp_dir: temp_dir,
        }
    }

    /// Returns the database file path.
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Returns the temporary directory holding the database.
    pub fn dir(&self) -> &Path {
        self._temp_dir.path()
    }

    /// Returns a path next to the database file.
    pub fn sibling(&self, name: &str) -> PathBuf {
        self.dir().join(name)
    }

    /// Derives the channel identity with the default configuration.
    pub fn identity(&self) -> ChannelIdentity {
        self.identity_with(&Config::default())
    }

    /// Derives the channel identity with a custom configuration.
    pub fn identity_with(&self, config: &Config) -> ChannelIdentity {
        ChannelIdentity::for_database(&self.db_path, config)
            .expect("Failed to derive channel identity")
    }
}

impl Default for TempDatabase {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts wake callbacks and lets tests block until enough have arrived.
#[derive(Clone, Default)]
pub struct WakeCounter {
    inner: Arc<CounterState>,
}

#[derive(Default)]
struct CounterState {
    count: Mutex<usize>,
    changed: Condvar,
}

impl WakeCounter {
    /// Creates a counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a wake callback that increments this counter.
    pub fn callback(&self) -> impl Fn() -> Result<(), WakeError> + Send + Sync + 'static {
        let counter = self.clone();
        move || {
            counter.record();
            Ok(())
        }
    }

    /// Records one wake.
    pub fn record(&self) {
        *self.inner.count.lock() += 1;
        self.inner.changed.notify_all();
    }

    /// Returns the number of wakes recorded so far.
    pub fn count(&self) -> usize {
        *self.inner.count.lock()
    }

    /// Waits until at least `at_least` wakes were recorded.
    ///
    /// Returns false on timeout.
    pub fn wait_for(&self, at_least: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.inner.count.lock();
        while *count < at_least {
            if self.inner.changed.wait_until(&mut count, deadline).timed_out() {
                break;
            }
        }
        *count >= at_least
    }

    /// Waits until no wake arrives for `quiet`, then returns the count.
    pub fn settle(&self, quiet: Duration) -> usize {
        let mut count = self.inner.count.lock();
        loop {
            let seen = *count;
            let timed_out = self.inner.changed.wait_for(&mut count, quiet).timed_out();
            if timed_out && *count == seen {
                return seen;
            }
        }
    }
}

/// Holds a callback until the test opens the gate.
///
/// The callback calls [`Gate::pass`]; the test waits for
/// [`Gate::wait_entered`], does its work while the listener is parked, then
/// calls [`Gate::open`].
#[derive(Clone, Default)]
pub struct Gate {
    inner: Arc<GateState>,
}

#[derive(Default)]
struct GateState {
    /// (entered, open)
    flags: Mutex<(bool, bool)>,
    changed: Condvar,
}

impl Gate {
    /// Creates a closed gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the gate as entered and blocks until it is open.
    pub fn pass(&self) {
        let mut flags = self.inner.flags.lock();
        flags.0 = true;
        self.inner.changed.notify_all();
        while !flags.1 {
            self.inner.changed.wait(&mut flags);
        }
    }

    /// Waits until some thread is inside [`Gate::pass`] (or has passed).
    pub fn wait_entered(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut flags = self.inner.flags.lock();
        while !flags.0 {
            if self.inner.changed.wait_until(&mut flags, deadline).timed_out() {
                break;
            }
        }
        flags.0
    }

    /// Opens the gate, releasing every waiting thread.
    pub fn open(&self) {
        self.inner.flags.lock().1 = true;
        self.inner.changed.notify_all();
    }

    /// Returns true once the gate is open.
    pub fn is_open(&self) -> bool {
        self.inner.flags.lock().1
    }
}
