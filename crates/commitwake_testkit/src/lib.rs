//! # commitwake Testkit
//!
//! Test utilities for commitwake.
//!
//! This crate provides:
//! - Temporary database fixtures and channel identities
//! - Wake counters and gates for driving listener threads from tests
//! - Descriptor and thread counting for leak checks
//! - Concurrent notification stress helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use commitwake_testkit::prelude::*;
//!
//! #[test]
//! fn wakes_peer() {
//!     let db = TempDatabase::new();
//!     let counter = WakeCounter::new();
//!     let _peer = CommitNotifier::new(&db.identity(), counter.callback()).unwrap();
//!     // ...
//! }
//! ```

#![cfg(any(target_os = "linux", target_os = "android"))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod descriptors;
pub mod fixtures;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::descriptors::*;
    pub use crate::fixtures::*;
    pub use crate::stress::*;
    pub use commitwake_core::{ChannelIdentity, CommitNotifier, Config, ListenerState};
}

pub use descriptors::*;
pub use fixtures::*;
pub use stress::*;
