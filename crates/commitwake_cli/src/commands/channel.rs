//! Channel command implementation.

use commitwake_core::{ChannelIdentity, Config};
use std::path::Path;

/// Prints where the wake channel for `db` lives.
pub fn run(db: &Path, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let identity = ChannelIdentity::for_database(db, config)?;

    println!("{}", identity.primary().display());
    if let Some(fallback) = identity.fallback() {
        println!("{} (fallback)", fallback.display());
    }

    Ok(())
}
