//! Notifier configuration.

use std::path::PathBuf;

/// Configuration for creating a commit notifier.
#[derive(Debug, Clone)]
pub struct Config {
    /// Suffix appended to the database path to name the wake channel.
    pub channel_suffix: String,

    /// Directory used for the wake channel when it cannot live beside the
    /// database file (e.g. the filesystem does not support FIFOs).
    pub fallback_dir: Option<PathBuf>,

    /// Permission bits for a newly created wake channel.
    pub fifo_mode: u32,

    /// Bound on the create-or-attach loop when racing other processes.
    pub attach_attempts: u32,

    /// Bound on write retries when the channel buffer is full.
    pub write_attempts: u32,

    /// Bound on non-blocking re-polls folded into one drain cycle.
    pub max_drain_rounds: u32,

    /// Name given to the listener thread.
    pub thread_name: String,

    /// Whether a watcher may open without notification support when the
    /// notifier cannot be initialized.
    pub allow_degraded: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel_suffix: ".note".to_string(),
            fallback_dir: None,
            fifo_mode: 0o600,
            attach_attempts: 5,
            write_attempts: 8,
            max_drain_rounds: 64,
            thread_name: "commit-notifier".to_string(),
            allow_degraded: false,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the wake channel suffix.
    #[must_use]
    pub fn channel_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.channel_suffix = suffix.into();
        self
    }

    /// Sets the fallback directory for the wake channel.
    #[must_use]
    pub fn fallback_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fallback_dir = Some(dir.into());
        self
    }

    /// Sets the permission bits for a newly created wake channel.
    #[must_use]
    pub const fn fifo_mode(mut self, mode: u32) -> Self {
        self.fifo_mode = mode;
        self
    }

    /// Sets the create-or-attach retry bound (at least one attempt is made).
    #[must_use]
    pub const fn attach_attempts(mut self, attempts: u32) -> Self {
        self.attach_attempts = attempts;
        self
    }

    /// Sets the write retry bound (at least one attempt is made).
    #[must_use]
    pub const fn write_attempts(mut self, attempts: u32) -> Self {
        self.write_attempts = attempts;
        self
    }

    /// Sets the bound on re-polls folded into one drain cycle.
    #[must_use]
    pub const fn max_drain_rounds(mut self, rounds: u32) -> Self {
        self.max_drain_rounds = rounds;
        self
    }

    /// Sets the listener thread name.
    #[must_use]
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Sets whether degraded (no-notification) mode is acceptable.
    #[must_use]
    pub const fn allow_degraded(mut self, value: bool) -> Self {
        self.allow_degraded = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.channel_suffix, ".note");
        assert!(config.fallback_dir.is_none());
        assert_eq!(config.fifo_mode, 0o600);
        assert!(config.attach_attempts > 0);
        assert!(!config.allow_degraded);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .channel_suffix(".wake")
            .fallback_dir("/tmp/wakes")
            .attach_attempts(2)
            .allow_degraded(true);

        assert_eq!(config.channel_suffix, ".wake");
        assert_eq!(config.fallback_dir, Some(PathBuf::from("/tmp/wakes")));
        assert_eq!(config.attach_attempts, 2);
        assert!(config.allow_degraded);
    }
}
