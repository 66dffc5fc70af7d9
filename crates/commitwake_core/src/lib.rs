//! # commitwake Core
//!
//! Cross-process commit notification for embedded, multi-process databases.
//!
//! When any process commits to a shared database file, every other handle on
//! that file (in any process, including the committing one) must wake up and
//! re-check its view. This crate provides:
//! - [`ScopedDescriptor`] for exclusive, close-once descriptor ownership
//! - [`ChannelIdentity`] for deriving the shared wake channel from a database path
//! - [`CommitNotifier`] with its listener thread and shutdown protocol
//! - [`WakeFeed`] and [`DatabaseWatcher`] for coordinators consuming wakes
//!
//! Notifications carry no content. Several commits may collapse into a
//! single wake; a wake only means "something changed, re-check".
//!
//! ## Platform support
//!
//! The notifier uses a FIFO as the wake channel and `epoll` as the readiness
//! multiplexer, so it is available on Linux and Android.

#![deny(unsafe_code)]
#![warn(missing_docs)]

#[cfg(unix)]
pub mod channel;
pub mod config;
#[cfg(unix)]
pub mod descriptor;
pub mod error;
pub mod feed;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod notifier;
pub mod stats;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod watcher;

#[cfg(unix)]
pub use channel::{open_channel, ChannelIdentity};
pub use config::Config;
#[cfg(unix)]
pub use descriptor::{Handle, ScopedDescriptor, UNSET_FD};
pub use error::{NotifyError, NotifyResult, WakeError};
pub use feed::{WakeEvent, WakeFeed};
#[cfg(any(target_os = "linux", target_os = "android"))]
pub use notifier::{CommitNotifier, ListenerState, WakeCallback};
pub use stats::{NotifierCounters, NotifierStats};
#[cfg(any(target_os = "linux", target_os = "android"))]
pub use watcher::DatabaseWatcher;
