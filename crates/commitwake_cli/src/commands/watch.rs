//! Watch command implementation.

use commitwake_core::{Config, DatabaseWatcher};
use serde::Serialize;
use std::path::Path;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};
use tracing::info;

/// One line of watch output.
#[derive(Debug, Serialize)]
pub struct WakeLine {
    /// Wake epoch reached.
    pub epoch: u64,
    /// Milliseconds since the watch started.
    pub elapsed_ms: u128,
}

/// How often the loop re-checks its deadline when nothing arrives.
const POLL: Duration = Duration::from_millis(250);

/// Prints wake cycles on `db` until `count` arrive or `timeout` passes.
///
/// Returns an error if the timeout passes first.
pub fn run(
    db: &Path,
    config: &Config,
    count: Option<u64>,
    timeout: Option<Duration>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let watcher = DatabaseWatcher::open(db, config)?;
    let events = watcher.subscribe();
    info!("Watching {:?}", watcher.identity().primary());

    let start = Instant::now();
    let deadline = timeout.map(|t| start + t);
    let mut seen = 0u64;

    while count.is_none_or(|n| seen < n) {
        let wait = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    watcher.close();
                    return Err(format!("timed out after {seen} wake(s)").into());
                }
                (deadline - now).min(POLL)
            }
            None => POLL,
        };

        let event = match events.recv_timeout(wait) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        seen += 1;

        let line = WakeLine {
            epoch: event.epoch,
            elapsed_ms: start.elapsed().as_millis(),
        };
        if json {
            println!("{}", serde_json::to_string(&line)?);
        } else {
            println!("wake epoch={} after {} ms", line.epoch, line.elapsed_ms);
        }
    }

    watcher.close();
    Ok(())
}
