//! Stress helpers for concurrent notification.
//!
//! These drive `notify_others` from many threads at once while listeners
//! are busy draining.

use commitwake_core::CommitNotifier;
use rand::Rng;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total notify calls issued.
    pub total_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Notify calls per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(total_ops: usize, duration: Duration) -> Self {
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total_ops as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total notifies: {}", self.total_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} notifies/sec", self.ops_per_second);
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of concurrent notifying threads.
    pub threads: usize,
    /// Notify calls per thread.
    pub notifies_per_thread: usize,
    /// One in this many calls is followed by a yield (0 disables).
    pub yield_one_in: u32,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 16,
            notifies_per_thread: 2_000,
            yield_one_in: 64,
        }
    }
}

/// Calls `notify_others` on one notifier from many threads.
pub fn stress_concurrent_notify(notifier: &CommitNotifier, config: &StressConfig) -> StressTestResult {
    stress_many_writers(std::slice::from_ref(notifier), config)
}

/// Calls `notify_others` from many threads, spread round-robin over several
/// notifiers attached to the same channel.
pub fn stress_many_writers(notifiers: &[CommitNotifier], config: &StressConfig) -> StressTestResult {
    assert!(!notifiers.is_empty(), "at least one notifier is required");
    let start = Instant::now();

    thread::scope(|scope| {
        for t in 0..config.threads {
            let notifier = &notifiers[t % notifiers.len()];
            let per_thread = config.notifies_per_thread;
            let yield_one_in = config.yield_one_in;

            scope.spawn(move || {
                let mut rng = rand::thread_rng();
                for _ in 0..per_thread {
                    notifier.notify_others();
                    if yield_one_in > 0 && rng.gen_ratio(1, yield_one_in) {
                        thread::yield_now();
                    }
                }
            });
        }
    });

    StressTestResult::new(config.threads * config.notifies_per_thread, start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_throughput() {
        let result = StressTestResult::new(1_000, Duration::from_millis(500));
        assert_eq!(result.total_ops, 1_000);
        assert!((result.ops_per_second - 2_000.0).abs() < 1e-6);
    }

    #[test]
    fn zero_duration_has_zero_throughput() {
        let result = StressTestResult::new(10, Duration::ZERO);
        assert_eq!(result.ops_per_second, 0.0);
    }
}
