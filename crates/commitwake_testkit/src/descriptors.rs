//! Descriptor and thread counting for leak checks.
//!
//! Counts entries in `/proc/self/fd` and `/proc/self/task`. Counts are process-wide, so tests using
//! them must not run alongside other descriptor-opening tests in the same
//! binary (mark them `#[serial]`).

use std::fs;
use std::thread;
use std::time::{Duration, Instant};

/// Returns the number of descriptors currently open in this process.
pub fn open_descriptor_count() -> usize {
    fs::read_dir("/proc/self/fd")
        .expect("Failed to list /proc/self/fd")
        .count()
}

/// Returns the number of live threads in this process named `name`.
///
/// Kernel thread names are truncated to 15 bytes, so `name` should be short.
pub fn live_threads_named(name: &str) -> usize {
    fs::read_dir("/proc/self/task")
        .expect("Failed to list /proc/self/task")
        .filter_map(Result::ok)
        .filter_map(|task| fs::read_to_string(task.path().join("comm")).ok())
        .filter(|comm| comm.trim_end() == name)
        .count()
}

/// Polls `cond` until it holds or `timeout` passes. Returns the last result.
pub fn eventually(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Records a baseline descriptor count and compares later counts against it.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorBaseline {
    baseline: usize,
}

impl DescriptorBaseline {
    /// Captures the current descriptor count as the baseline.
    pub fn new() -> Self {
        Self {
            baseline: open_descriptor_count(),
        }
    }

    /// Returns the baseline count.
    pub fn baseline(&self) -> usize {
        self.baseline
    }

    /// Returns how many descriptors are open beyond the baseline.
    pub fn delta(&self) -> isize {
        open_descriptor_count() as isize - self.baseline as isize
    }

    /// Waits until every descriptor opened since the baseline is closed.
    ///
    /// Returns false on timeout.
    pub fn wait_for_release(&self, timeout: Duration) -> bool {
        eventually(timeout, || self.delta() <= 0)
    }

    /// Panics if any descriptor opened since the baseline is still open.
    pub fn assert_no_leaks(&self, context: &str) {
        let delta = self.delta();
        assert_eq!(
            delta, 0,
            "{context}: {delta} descriptor(s) leaked (baseline {})",
            self.baseline
        );
    }
}

impl Default for DescriptorBaseline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_is_positive() {
        // stdin, stdout, stderr and the directory handle itself.
        assert!(open_descriptor_count() >= 3);
    }

    #[test]
    fn finds_named_thread() {
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("named-sleeper".into())
            .spawn(move || {
                let _ = rx.recv();
            })
            .unwrap();

        assert!(eventually(Duration::from_secs(5), || live_threads_named("named-sleeper") == 1));
        drop(tx);
        handle.join().unwrap();
        assert_eq!(live_threads_named("named-sleeper"), 0);
    }
}
