//! Cross-process commit notifier.
//!
//! A [`CommitNotifier`] connects one open database handle to the shared wake
//! channel of its database file. After a commit, the transaction engine calls
//! [`CommitNotifier::notify_others`]; every notifier attached to the same
//! channel, in this process or any other, then runs its wake callback on its
//! own listener thread.
//!
//! # Listener thread
//!
//! The listener blocks in `epoll_wait` on two sources:
//!
//! - the wake channel, registered edge-triggered so that every token written
//!   by any process produces a readiness edge for every attached listener;
//! - the read end of a private self-signal pipe, written only by shutdown.
//!
//! ```text
//!            channel edge                 callback returns
//! Running ────────────────▶ Draining ─────────────────────▶ Running
//!    │                         │
//!    └──── self-signal ────────┴──────────▶ Stopped
//! ```
//!
//! While draining, the listener folds every readiness edge that is already
//! pending into one cycle, then invokes the callback once. The self-signal is
//! checked first in every batch of events, so shutdown latency does not
//! depend on notification volume.
//!
//! A new notifier starts with no pending wake: readiness left over from
//! tokens buffered before it attached is discarded before its listener
//! starts. A commit that races with construction may or may not wake it.
//!
//! Tokens are never read by listeners: a FIFO delivers each byte to exactly
//! one reader, so a listener that drained the channel could hide a token
//! from its peers. Writers keep the buffer bounded instead (see
//! [`CommitNotifier::notify_others`]).
//!
//! # Shutdown
//!
//! [`CommitNotifier::shutdown`] (also run on drop) raises the stop flag,
//! signals the listener, joins it, and only then closes the descriptors the
//! listener was using.

use crate::channel::{open_channel, ChannelIdentity};
use crate::config::Config;
use crate::descriptor::ScopedDescriptor;
use crate::error::{NotifyError, NotifyResult, WakeError};
use crate::stats::{NotifierCounters, NotifierStats};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
use nix::unistd::{pipe2, read, write};
use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::os::fd::AsRawFd;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, trace, warn};

/// Epoll user data identifying the wake channel.
const CHANNEL_EVENT: u64 = 1;
/// Epoll user data identifying the self-signal.
const SHUTDOWN_EVENT: u64 = 2;

/// Byte written to the wake channel. Its value is never inspected.
const WAKE_TOKEN: u8 = 0;
/// Byte written to the self-signal.
const STOP_TOKEN: u8 = 1;

/// Bytes discarded per attempt when the wake channel buffer is full.
const DRAIN_CHUNK: usize = 1024;
/// Events fetched per `epoll_wait` call. Two sources never need more.
const EVENT_BATCH: usize = 4;

/// Callback run on the listener thread after each drain cycle.
pub type WakeCallback = Box<dyn Fn() -> Result<(), WakeError> + Send + Sync>;

/// Observable state of a notifier's listener thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ListenerState {
    /// Blocked waiting for readiness, or about to.
    Running = 0,
    /// Folding pending wakes together and running the callback.
    Draining = 1,
    /// The listener has exited.
    Stopped = 2,
}

impl ListenerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

/// What one `epoll_wait` call reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    /// Nothing ready.
    Idle,
    /// The wake channel produced at least one edge.
    Wake,
    /// The self-signal fired.
    Shutdown,
    /// The wait itself failed; the listener cannot continue.
    Failed,
}

impl Readiness {
    fn classify(ready: &[EpollEvent]) -> Self {
        // Shutdown wins over any number of pending wakes.
        if ready.iter().any(|event| event.data() == SHUTDOWN_EVENT) {
            Self::Shutdown
        } else if ready.iter().any(|event| event.data() == CHANNEL_EVENT) {
            Self::Wake
        } else {
            Self::Idle
        }
    }
}

/// State shared between the notifier handle and its listener thread.
struct Shared {
    /// Wake channel, opened read-write.
    channel: ScopedDescriptor,
    /// Readiness multiplexer.
    poller: ScopedDescriptor<Epoll>,
    /// Read end of the self-signal pipe.
    shutdown_rx: ScopedDescriptor,
    /// Set once shutdown begins; checked before every callback.
    stopping: AtomicBool,
    /// Held for the duration of each callback.
    dispatch_lock: Mutex<()>,
    state: AtomicU8,
    counters: NotifierCounters,
    on_wake: WakeCallback,
    max_drain_rounds: u32,
    path: PathBuf,
}

impl Shared {
    fn state(&self) -> ListenerState {
        ListenerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ListenerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn run(&self) {
        debug!(path = %self.path.display(), "commit listener started");
        let mut events = [EpollEvent::empty(); EVENT_BATCH];

        loop {
            self.set_state(ListenerState::Running);
            match self.wait(&mut events, EpollTimeout::NONE) {
                Readiness::Wake => {}
                Readiness::Idle => continue,
                Readiness::Shutdown | Readiness::Failed => break,
            }

            self.set_state(ListenerState::Draining);
            if matches!(
                self.drain(&mut events),
                Readiness::Shutdown | Readiness::Failed
            ) {
                break;
            }

            if !self.dispatch() {
                break;
            }
        }

        self.set_state(ListenerState::Stopped);
        debug!(path = %self.path.display(), "commit listener stopped");
    }

    fn wait(&self, events: &mut [EpollEvent], timeout: EpollTimeout) -> Readiness {
        let Some(epoll) = self.poller.get() else {
            error!("readiness multiplexer is closed; stopping commit listener");
            return Readiness::Failed;
        };

        loop {
            match epoll.wait(events, timeout) {
                Ok(n) => return Readiness::classify(&events[..n]),
                Err(Errno::EINTR) => continue,
                Err(errno) => {
                    error!(error = %errno, "epoll wait failed; stopping commit listener");
                    return Readiness::Failed;
                }
            }
        }
    }

    /// Collects edges that are already pending without blocking.
    ///
    /// Returns `Idle` once nothing more is pending, `Wake` if the round
    /// limit was reached first.
    fn drain(&self, events: &mut [EpollEvent]) -> Readiness {
        for _ in 0..self.max_drain_rounds {
            match self.wait(events, EpollTimeout::ZERO) {
                Readiness::Wake => continue,
                other => return other,
            }
        }
        Readiness::Wake
    }

    /// Runs the wake callback once. Returns false if shutdown has begun.
    fn dispatch(&self) -> bool {
        let _dispatching = self.dispatch_lock.lock();
        if self.stopping.load(Ordering::Acquire) {
            return false;
        }

        self.counters.record_wake_cycle();
        match panic::catch_unwind(AssertUnwindSafe(|| (self.on_wake)())) {
            Ok(Ok(())) => trace!("wake callback completed"),
            Ok(Err(err)) => {
                self.counters.record_callback_failure();
                warn!(error = %NotifyError::callback(&err), "wake callback failed; listener continues");
            }
            Err(_) => {
                self.counters.record_callback_failure();
                error!("wake callback panicked; listener continues");
            }
        }
        true
    }

    fn write_token(&self, attempts: u32) -> NotifyResult<()> {
        let fd = self
            .channel
            .get()
            .ok_or_else(|| NotifyError::TransientWrite(io::ErrorKind::NotConnected.into()))?;

        // Consume one stale token first so the buffer stays bounded. The
        // write below produces a fresh edge for every listener.
        let mut stale = [0u8; 1];
        match read(fd.as_raw_fd(), &mut stale) {
            Ok(_) | Err(Errno::EAGAIN) | Err(Errno::EINTR) => {}
            Err(errno) => return Err(NotifyError::TransientWrite(errno.into())),
        }

        for _ in 0..attempts.max(1) {
            match write(fd, &[WAKE_TOKEN]) {
                Ok(1) => return Ok(()),
                Ok(_) | Err(Errno::EINTR) => {}
                Err(Errno::EAGAIN) => {
                    let mut chunk = [0u8; DRAIN_CHUNK];
                    let _ = read(fd.as_raw_fd(), &mut chunk);
                }
                Err(errno) => return Err(NotifyError::TransientWrite(errno.into())),
            }
        }

        Err(NotifyError::TransientWrite(io::ErrorKind::WouldBlock.into()))
    }

    fn release(&mut self) {
        self.poller.reset();
        self.shutdown_rx.reset();
        self.channel.reset();
    }
}

/// Consumes the edge reported for tokens already buffered at registration.
///
/// Those tokens belong to commits made before this notifier existed.
fn discard_initial_edge(poller: &Epoll) -> NotifyResult<()> {
    let mut events = [EpollEvent::empty(); EVENT_BATCH];
    loop {
        match poller.wait(&mut events, EpollTimeout::ZERO) {
            Ok(_) => return Ok(()),
            Err(Errno::EINTR) => continue,
            Err(errno) => return Err(NotifyError::resource_init("initial readiness poll", errno)),
        }
    }
}

/// Wakes every handle on the same database when this one commits.
///
/// One notifier belongs to one open database handle. It owns the wake
/// channel descriptor, a readiness multiplexer, a self-signal pipe and a
/// listener thread.
///
/// # Example
///
/// ```rust,no_run
/// use commitwake_core::{ChannelIdentity, CommitNotifier, Config};
/// use std::path::Path;
///
/// let config = Config::default();
/// let identity = ChannelIdentity::for_database(Path::new("app.db"), &config)?;
/// let notifier = CommitNotifier::with_config(&identity, &config, || {
///     // Re-read shared state and dispatch local change listeners.
///     Ok(())
/// })?;
///
/// // After every successful commit:
/// notifier.notify_others();
/// # Ok::<(), commitwake_core::NotifyError>(())
/// ```
pub struct CommitNotifier {
    shared: Arc<Shared>,
    /// Write end of the self-signal pipe.
    shutdown_tx: ScopedDescriptor,
    listener: Option<JoinHandle<()>>,
    write_attempts: u32,
}

impl CommitNotifier {
    /// Creates a notifier with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an initialization error if the wake channel or any private
    /// resource cannot be set up. Nothing stays open in that case.
    pub fn new<F>(identity: &ChannelIdentity, on_wake: F) -> NotifyResult<Self>
    where
        F: Fn() -> Result<(), WakeError> + Send + Sync + 'static,
    {
        Self::with_config(identity, &Config::default(), on_wake)
    }

    /// Creates a notifier.
    ///
    /// Opens (or creates) the wake channel, creates the self-signal and the
    /// multiplexer, registers both sources and spawns the listener thread.
    ///
    /// # Errors
    ///
    /// Returns an initialization error if any step fails. Descriptors
    /// acquired before the failure are closed and no thread is left running.
    pub fn with_config<F>(
        identity: &ChannelIdentity,
        config: &Config,
        on_wake: F,
    ) -> NotifyResult<Self>
    where
        F: Fn() -> Result<(), WakeError> + Send + Sync + 'static,
    {
        let channel = open_channel(identity, config)?;

        let (shutdown_rx, shutdown_tx) = pipe2(OFlag::O_CLOEXEC | OFlag::O_NONBLOCK)
            .map_err(|errno| NotifyError::resource_init("self-signal pipe", errno))?;

        let poller = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)
            .map_err(|errno| NotifyError::resource_init("epoll instance", errno))?;
        poller
            .add(
                &channel,
                EpollEvent::new(EpollFlags::EPOLLIN | EpollFlags::EPOLLET, CHANNEL_EVENT),
            )
            .map_err(|errno| NotifyError::resource_init("wake channel registration", errno))?;
        poller
            .add(
                &shutdown_rx,
                EpollEvent::new(EpollFlags::EPOLLIN, SHUTDOWN_EVENT),
            )
            .map_err(|errno| NotifyError::resource_init("self-signal registration", errno))?;

        discard_initial_edge(&poller)?;

        let path = identity.primary().to_path_buf();
        let shared = Arc::new(Shared {
            channel: ScopedDescriptor::from(channel),
            poller: ScopedDescriptor::from(poller),
            shutdown_rx: ScopedDescriptor::from(shutdown_rx),
            stopping: AtomicBool::new(false),
            dispatch_lock: Mutex::new(()),
            state: AtomicU8::new(ListenerState::Running as u8),
            counters: NotifierCounters::new(),
            on_wake: Box::new(on_wake),
            max_drain_rounds: config.max_drain_rounds,
            path,
        });

        let listener = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn({
                let shared = Arc::clone(&shared);
                move || shared.run()
            })
            .map_err(|err| NotifyError::resource_init("listener thread", err))?;

        debug!(path = %shared.path.display(), "commit notifier ready");

        Ok(Self {
            shared,
            shutdown_tx: ScopedDescriptor::from(shutdown_tx),
            listener: Some(listener),
            write_attempts: config.write_attempts,
        })
    }

    /// Wakes every notifier attached to this database, including this one.
    ///
    /// Safe to call from any thread, concurrently, at any rate. Never blocks:
    /// when the channel buffer is full, stale tokens are discarded to make
    /// room, and if that keeps failing the token is dropped. A dropped token
    /// is harmless since the next commit's token covers it.
    pub fn notify_others(&self) {
        match self.shared.write_token(self.write_attempts) {
            Ok(()) => self.shared.counters.record_token_written(),
            Err(err) => {
                self.shared.counters.record_token_dropped();
                debug!(error = %err, "dropped wake token");
            }
        }
    }

    /// Stops the listener thread and closes every descriptor.
    ///
    /// Idempotent. Blocks until a callback in progress returns. No callback
    /// starts after this is called.
    ///
    /// When called from this notifier's own wake callback (for example by
    /// dropping the last owner there), it does not block: the listener
    /// stops as soon as the callback returns.
    pub fn shutdown(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };

        self.shared.stopping.store(true, Ordering::Release);

        if listener.thread().id() == thread::current().id() {
            // Running inside the wake callback: this thread holds the
            // dispatch lock and cannot join itself. The listener exits once
            // the callback returns, and its reference closes the descriptors.
            self.signal_listener();
            self.shutdown_tx.reset();
            debug!(
                path = %self.shared.path.display(),
                "commit notifier shut down from its own callback"
            );
            return;
        }

        // Wait out a callback already in progress; none can start after this.
        drop(self.shared.dispatch_lock.lock());
        self.signal_listener();

        if listener.join().is_err() {
            error!(path = %self.shared.path.display(), "commit listener thread panicked");
        }

        self.shutdown_tx.reset();
        match Arc::get_mut(&mut self.shared) {
            Some(shared) => shared.release(),
            None => warn!("commit listener state still shared after join"),
        }
        debug!(path = %self.shared.path.display(), "commit notifier shut down");
    }

    fn signal_listener(&mut self) {
        let Some(fd) = self.shutdown_tx.get() else {
            return;
        };

        loop {
            match write(fd, &[STOP_TOKEN]) {
                Ok(_) => return,
                Err(Errno::EINTR) => continue,
                Err(errno) => {
                    // Closing the write end hangs up the read end, which
                    // epoll reports for the same source.
                    warn!(error = %errno, "self-signal write failed; closing it instead");
                    break;
                }
            }
        }
        self.shutdown_tx.reset();
    }

    /// Returns the wake channel location this notifier was created for.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Returns the listener thread's current state.
    #[must_use]
    pub fn listener_state(&self) -> ListenerState {
        self.shared.state()
    }

    /// Returns a snapshot of this notifier's counters.
    #[must_use]
    pub fn stats(&self) -> NotifierStats {
        self.shared.counters.snapshot()
    }
}

impl Drop for CommitNotifier {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for CommitNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitNotifier")
            .field("path", &self.shared.path)
            .field("state", &self.listener_state())
            .field("channel", &self.shared.channel)
            .finish_non_exhaustive()
    }
}
