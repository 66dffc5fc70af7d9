//! Notify command implementation.

use commitwake_core::{ChannelIdentity, CommitNotifier, Config};
use std::path::Path;
use tracing::info;

/// Announces `count` commits on `db`.
pub fn run(db: &Path, config: &Config, count: u64) -> Result<(), Box<dyn std::error::Error>> {
    let identity = ChannelIdentity::for_database(db, config)?;
    // This handle's own wakes are not interesting here.
    let notifier = CommitNotifier::with_config(&identity, config, || Ok(()))?;

    for _ in 0..count {
        notifier.notify_others();
    }

    let stats = notifier.stats();
    info!(
        "Announced {} commit(s) on {:?} ({} dropped)",
        stats.tokens_written,
        notifier.path(),
        stats.tokens_dropped
    );

    Ok(())
}
