//! Error types for commit notification.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for notifier operations.
pub type NotifyResult<T> = Result<T, NotifyError>;

/// Error type returned by a wake callback.
///
/// Callback failures never leave the listener thread; they are logged and
/// counted in [`NotifierStats`](crate::NotifierStats).
pub type WakeError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while setting up or driving a commit notifier.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The wake channel could not be created or opened.
    #[error("cannot open wake channel at {}: {source}", path.display())]
    ChannelInit {
        /// Location of the wake channel.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Something other than a FIFO occupies the wake channel path.
    #[error("wake channel path exists but is not a FIFO: {}", path.display())]
    NotAFifo {
        /// Location of the offending file.
        path: PathBuf,
    },

    /// The create-or-attach loop kept racing with another process.
    #[error("gave up attaching to wake channel at {} after {attempts} attempts", path.display())]
    AttachExhausted {
        /// Location of the wake channel.
        path: PathBuf,
        /// Number of attempts made.
        attempts: u32,
    },

    /// A private OS resource (multiplexer, self-signal, thread) could not be allocated.
    #[error("failed to allocate {resource}: {source}")]
    ResourceInit {
        /// Which resource failed.
        resource: &'static str,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The database path cannot be turned into a channel identity.
    #[error("invalid database path: {message}")]
    InvalidPath {
        /// Description of the problem.
        message: String,
    },

    /// A wake token could not be enqueued.
    ///
    /// Never surfaced from `notify_others`; the next commit's token covers it.
    #[error("wake token write failed: {0}")]
    TransientWrite(#[source] io::Error),

    /// The wake callback reported a failure.
    #[error("wake callback failed: {message}")]
    Callback {
        /// Rendered callback error.
        message: String,
    },
}

impl NotifyError {
    /// Creates a channel initialization error.
    pub fn channel_init(path: impl Into<PathBuf>, source: impl Into<io::Error>) -> Self {
        Self::ChannelInit {
            path: path.into(),
            source: source.into(),
        }
    }

    /// Creates a resource initialization error.
    pub fn resource_init(resource: &'static str, source: impl Into<io::Error>) -> Self {
        Self::ResourceInit {
            resource,
            source: source.into(),
        }
    }

    /// Creates an invalid path error.
    pub fn invalid_path(message: impl Into<String>) -> Self {
        Self::InvalidPath {
            message: message.into(),
        }
    }

    /// Creates a callback error from whatever the callback returned.
    pub fn callback(error: &WakeError) -> Self {
        Self::Callback {
            message: error.to_string(),
        }
    }

    /// Returns true if this error means the notifier could not be constructed.
    #[must_use]
    pub fn is_initialization(&self) -> bool {
        matches!(
            self,
            Self::ChannelInit { .. }
                | Self::NotAFifo { .. }
                | Self::AttachExhausted { .. }
                | Self::ResourceInit { .. }
                | Self::InvalidPath { .. }
        )
    }
}
