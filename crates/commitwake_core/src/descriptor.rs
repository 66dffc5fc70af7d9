//! Exclusive ownership of OS descriptors.
//!
//! [`ScopedDescriptor`] holds at most one kernel object and releases it
//! exactly once: when it is reassigned, reset, or dropped. It cannot be
//! cloned, so no aliasing copy can close the descriptor behind its back.
//!
//! ```rust
//! use commitwake_core::ScopedDescriptor;
//!
//! let (read_end, write_end) = nix::unistd::pipe().unwrap();
//! let mut fd = ScopedDescriptor::from(read_end);
//! assert!(fd.is_set());
//!
//! // Closes the read end before adopting the write end.
//! fd.assign(write_end);
//!
//! fd.reset();
//! assert_eq!(fd.raw(), commitwake_core::UNSET_FD);
//! ```

use std::fmt;
use std::io;
use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd, RawFd};
use tracing::warn;

/// Raw value reported by an unset descriptor.
pub const UNSET_FD: RawFd = -1;

/// An owned kernel object that a [`ScopedDescriptor`] can hold.
pub trait Handle {
    /// Returns the raw descriptor without giving up ownership.
    fn raw_fd(&self) -> RawFd;

    /// Closes the object, reporting the result of the close call.
    fn close(self) -> io::Result<()>;
}

impl Handle for OwnedFd {
    fn raw_fd(&self) -> RawFd {
        self.as_raw_fd()
    }

    fn close(self) -> io::Result<()> {
        nix::unistd::close(self.into_raw_fd()).map_err(io::Error::from)
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
impl Handle for nix::sys::epoll::Epoll {
    fn raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }

    fn close(self) -> io::Result<()> {
        self.0.close()
    }
}

/// A reassignable, move-only owner of one OS descriptor.
///
/// # Lifecycle
///
/// - Created unset ([`ScopedDescriptor::new`]) or from an owned handle.
/// - [`assign`](ScopedDescriptor::assign) closes the current handle, then adopts
///   the new one, even when the new value is `None`.
/// - Dropping closes the held handle; dropping an unset instance does nothing.
///
/// A failing close is logged and otherwise ignored. Release paths never panic.
pub struct ScopedDescriptor<T: Handle = OwnedFd> {
    handle: Option<T>,
}

impl<T: Handle> ScopedDescriptor<T> {
    /// Creates an unset descriptor.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Closes any held handle, then adopts `handle`.
    pub fn assign(&mut self, handle: impl Into<Option<T>>) {
        self.release();
        self.handle = handle.into();
    }

    /// Closes the held handle and leaves this descriptor unset.
    pub fn reset(&mut self) {
        self.assign(None);
    }

    /// Returns the raw descriptor, or [`UNSET_FD`] when nothing is held.
    #[must_use]
    pub fn raw(&self) -> RawFd {
        self.handle.as_ref().map_or(UNSET_FD, Handle::raw_fd)
    }

    /// Borrows the held handle.
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        self.handle.as_ref()
    }

    /// Returns true if a live handle is held.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.handle.is_some()
    }

    fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            let fd = handle.raw_fd();
            if let Err(err) = handle.close() {
                warn!(fd, error = %err, "failed to close descriptor");
            }
        }
    }
}

impl<T: Handle> Default for ScopedDescriptor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Handle> From<T> for ScopedDescriptor<T> {
    fn from(handle: T) -> Self {
        Self {
            handle: Some(handle),
        }
    }
}

impl<T: Handle> AsRawFd for ScopedDescriptor<T> {
    fn as_raw_fd(&self) -> RawFd {
        self.raw()
    }
}

impl<T: Handle> Drop for ScopedDescriptor<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T: Handle> fmt::Debug for ScopedDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedDescriptor")
            .field("fd", &self.raw())
            .finish()
    }
}
