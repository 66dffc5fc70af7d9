//! Wake channel identity and create-or-attach.
//!
//! Every process that opens the same database file must rendezvous on the
//! same kernel object. The wake channel is a FIFO named after the database's
//! canonical path:
//!
//! ```text
//! /data/app.db        # database file
//! /data/app.db.note   # wake channel (FIFO)
//! ```
//!
//! When the FIFO cannot be created beside the database and a fallback
//! directory is configured, the channel lives at
//! `<fallback_dir>/commitwake-<hash>.note`, where `<hash>` is derived from the
//! canonical database path.
//!
//! The FIFO is never removed by a departing process. The next opener attaches
//! to it, or recreates it if it is gone.

use crate::config::Config;
use crate::error::{NotifyError, NotifyResult};
use nix::errno::Errno;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io;
use std::os::fd::OwnedFd;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Prefix of wake channel names placed in a fallback directory.
const FALLBACK_PREFIX: &str = "commitwake-";

/// Number of digest bytes used in a fallback channel name.
const FALLBACK_HASH_BYTES: usize = 16;

/// Where the wake channel for one database lives.
///
/// Derivation is deterministic: the same database path and configuration
/// always produce the same identity, in every process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelIdentity {
    primary: PathBuf,
    fallback: Option<PathBuf>,
}

impl ChannelIdentity {
    /// Derives the channel identity for a database file.
    ///
    /// The database file does not need to exist yet.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` if the path is empty or has no file name.
    pub fn for_database(db_path: &Path, config: &Config) -> NotifyResult<Self> {
        let canonical = canonical_database_path(db_path)?;

        let mut primary = canonical.clone().into_os_string();
        primary.push(&config.channel_suffix);

        let fallback = config
            .fallback_dir
            .as_ref()
            .map(|dir| dir.join(fallback_name(&canonical, &config.channel_suffix)));

        Ok(Self {
            primary: PathBuf::from(primary),
            fallback,
        })
    }

    /// Uses an explicit channel path with no fallback.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            primary: path.into(),
            fallback: None,
        }
    }

    /// Returns the preferred channel location.
    #[must_use]
    pub fn primary(&self) -> &Path {
        &self.primary
    }

    /// Returns the fallback channel location, if one is configured.
    #[must_use]
    pub fn fallback(&self) -> Option<&Path> {
        self.fallback.as_deref()
    }
}

/// Resolves a database path to a stable absolute form.
///
/// Symlinks are resolved when the file (or its parent directory) exists so
/// that two spellings of the same file agree on one channel.
fn canonical_database_path(db_path: &Path) -> NotifyResult<PathBuf> {
    if db_path.as_os_str().is_empty() {
        return Err(NotifyError::invalid_path("empty database path"));
    }

    if let Ok(path) = db_path.canonicalize() {
        return Ok(path);
    }

    let file_name = db_path.file_name().ok_or_else(|| {
        NotifyError::invalid_path(format!("no file name in {}", db_path.display()))
    })?;
    let parent = db_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    match parent.canonicalize() {
        Ok(dir) => Ok(dir.join(file_name)),
        Err(_) => std::path::absolute(db_path)
            .map_err(|err| NotifyError::invalid_path(format!("{}: {err}", db_path.display()))),
    }
}

fn fallback_name(canonical: &Path, suffix: &str) -> String {
    let digest = Sha256::digest(canonical.as_os_str().as_bytes());

    let mut name = String::from(FALLBACK_PREFIX);
    for byte in &digest[..FALLBACK_HASH_BYTES] {
        let _ = write!(name, "{byte:02x}");
    }
    name.push_str(suffix);
    name
}

/// Opens the wake channel, creating it if no process has yet.
///
/// Tries the primary location first, then the fallback location if one is
/// configured. The returned descriptor is read-write and non-blocking.
///
/// # Errors
///
/// Returns an initialization error if neither location can be opened.
pub fn open_channel(identity: &ChannelIdentity, config: &Config) -> NotifyResult<OwnedFd> {
    let err = match create_or_attach(identity.primary(), config) {
        Ok(fd) => return Ok(fd),
        Err(err) => err,
    };

    let Some(fallback) = identity.fallback() else {
        return Err(err);
    };

    warn!(
        primary = %identity.primary().display(),
        fallback = %fallback.display(),
        error = %err,
        "wake channel unavailable beside database; using fallback location"
    );

    if let Some(dir) = fallback.parent() {
        fs::create_dir_all(dir).map_err(|e| NotifyError::channel_init(fallback, e))?;
    }
    create_or_attach(fallback, config)
}

/// Runs the bounded create-or-attach loop at one location.
///
/// Another process may create, or remove, the FIFO between any two steps.
/// Each race restarts the loop until `attach_attempts` runs out.
fn create_or_attach(path: &Path, config: &Config) -> NotifyResult<OwnedFd> {
    let mode = Mode::from_bits_truncate(config.fifo_mode as libc::mode_t);
    let attempts = config.attach_attempts.max(1);

    for attempt in 1..=attempts {
        match mkfifo(path, mode) {
            Ok(()) => debug!(path = %path.display(), "created wake channel"),
            Err(Errno::EEXIST) => {}
            Err(errno) => return Err(NotifyError::channel_init(path, errno)),
        }

        match fs::metadata(path) {
            Ok(meta) if meta.file_type().is_fifo() => {}
            Ok(_) => {
                return Err(NotifyError::NotAFifo {
                    path: path.to_path_buf(),
                })
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                trace!(attempt, path = %path.display(), "wake channel vanished before open");
                continue;
            }
            Err(err) => return Err(NotifyError::channel_init(path, err)),
        }

        // O_RDWR keeps the open from blocking for a peer and keeps the FIFO
        // alive for writers even when no other process has it open.
        match OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
        {
            Ok(file) => {
                debug!(path = %path.display(), attempt, "attached to wake channel");
                return Ok(OwnedFd::from(file));
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                trace!(attempt, path = %path.display(), "wake channel vanished during open");
            }
            Err(err) => return Err(NotifyError::channel_init(path, err)),
        }
    }

    Err(NotifyError::AttachExhausted {
        path: path.to_path_buf(),
        attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn identity_appends_suffix() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("app.db");
        File::create(&db_path).unwrap();

        let identity = ChannelIdentity::for_database(&db_path, &Config::default()).unwrap();
        let expected = temp.path().canonicalize().unwrap().join("app.db.note");
        assert_eq!(identity.primary(), expected);
        assert!(identity.fallback().is_none());
    }

    #[test]
    fn identity_for_missing_database_file() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("not-yet.db");

        let identity = ChannelIdentity::for_database(&db_path, &Config::default()).unwrap();
        let expected = temp.path().canonicalize().unwrap().join("not-yet.db.note");
        assert_eq!(identity.primary(), expected);
    }

    #[test]
    fn identity_is_deterministic_and_distinct() {
        let temp = tempdir().unwrap();
        let config = Config::new().fallback_dir(temp.path().join("fallback"));

        let a = ChannelIdentity::for_database(&temp.path().join("a.db"), &config).unwrap();
        let a_again = ChannelIdentity::for_database(&temp.path().join("a.db"), &config).unwrap();
        let b = ChannelIdentity::for_database(&temp.path().join("b.db"), &config).unwrap();

        assert_eq!(a, a_again);
        assert_ne!(a.primary(), b.primary());
        assert_ne!(a.fallback(), b.fallback());
    }

    #[test]
    fn two_spellings_share_identity() {
        let temp = tempdir().unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();
        let direct = temp.path().join("app.db");
        let dotted = temp.path().join("sub").join("..").join("app.db");
        File::create(&direct).unwrap();

        let config = Config::default();
        assert_eq!(
            ChannelIdentity::for_database(&direct, &config).unwrap(),
            ChannelIdentity::for_database(&dotted, &config).unwrap()
        );
    }

    #[test]
    fn fallback_name_shape() {
        let name = fallback_name(Path::new("/data/app.db"), ".note");
        assert!(name.starts_with(FALLBACK_PREFIX));
        assert!(name.ends_with(".note"));
        let hex = &name[FALLBACK_PREFIX.len()..name.len() - ".note".len()];
        assert_eq!(hex.len(), FALLBACK_HASH_BYTES * 2);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn empty_path_is_rejected() {
        let result = ChannelIdentity::for_database(Path::new(""), &Config::default());
        assert!(matches!(result, Err(NotifyError::InvalidPath { .. })));
    }

    #[test]
    fn create_then_attach() {
        let temp = tempdir().unwrap();
        let identity = ChannelIdentity::at(temp.path().join("shared.note"));
        let config = Config::default();

        let first = open_channel(&identity, &config).unwrap();
        let second = open_channel(&identity, &config).unwrap();
        drop(first);
        drop(second);

        let meta = fs::metadata(identity.primary()).unwrap();
        assert!(meta.file_type().is_fifo());
    }

    #[test]
    fn regular_file_is_not_a_channel() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("occupied.note");
        File::create(&path).unwrap();

        let result = open_channel(&ChannelIdentity::at(&path), &Config::default());
        assert!(matches!(result, Err(NotifyError::NotAFifo { .. })));
    }

    #[test]
    fn missing_directory_fails() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("missing").join("db.note");

        let result = open_channel(&ChannelIdentity::at(&path), &Config::default());
        match result {
            Err(err @ NotifyError::ChannelInit { .. }) => assert!(err.is_initialization()),
            other => panic!("expected ChannelInit, got {other:?}"),
        }
    }

    #[test]
    fn falls_back_when_primary_unusable() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("app.db");
        // Occupy the primary location with a regular file.
        File::create(temp.path().join("app.db.note")).unwrap();

        let config = Config::new().fallback_dir(temp.path().join("wakes"));
        let identity = ChannelIdentity::for_database(&db_path, &config).unwrap();

        let fd = open_channel(&identity, &config).unwrap();
        drop(fd);

        let fallback = identity.fallback().unwrap();
        assert!(fs::metadata(fallback).unwrap().file_type().is_fifo());
    }

    proptest::proptest! {
        #[test]
        fn fallback_names_are_flat_and_stable(
            dir in "(/[a-z0-9_]{1,8}){1,4}",
            file in "[a-z][a-z0-9_.-]{0,15}",
        ) {
            let path = Path::new(&dir).join(&file);
            let name = fallback_name(&path, ".note");

            proptest::prop_assert_eq!(&name, &fallback_name(&path, ".note"));
            proptest::prop_assert!(!name.contains('/'));
            proptest::prop_assert_eq!(
                name.len(),
                FALLBACK_PREFIX.len() + FALLBACK_HASH_BYTES * 2 + ".note".len()
            );
        }
    }
}
