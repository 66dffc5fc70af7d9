//! CLI command implementations.

pub mod channel;
pub mod notify;
pub mod watch;
