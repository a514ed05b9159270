//! Bounded retries with a fixed delay.

use std::thread;
use std::time::Duration;

use tracing::debug;

/// Default number of attempts for file moves.
pub const DEFAULT_MOVE_ATTEMPTS: u32 = 3;

/// Default delay between file move attempts.
pub const DEFAULT_MOVE_DELAY: Duration = Duration::from_millis(200);

/// How often to try an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one. Zero is treated
    /// as one.
    pub attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_MOVE_ATTEMPTS,
            delay: DEFAULT_MOVE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a retry policy.
    #[must_use]
    pub const fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// A policy that tries exactly once.
    #[must_use]
    pub const fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Runs `op` until it succeeds, fails with an error `is_transient`
    /// rejects, or the attempts are used up.
    ///
    /// `op` receives the 1-based attempt number. Returns the last result
    /// together with the number of attempts made. Blocks the calling thread
    /// for the delay between attempts.
    pub fn run<T, E>(
        &self,
        mut op: impl FnMut(u32) -> Result<T, E>,
        is_transient: impl Fn(&E) -> bool,
    ) -> (Result<T, E>, u32) {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = op(attempt);
            match &result {
                Err(e) if attempt < attempts && is_transient(e) => {
                    debug!(attempt, attempts, "Transient failure, retrying");
                    if !self.delay.is_zero() {
                        thread::sleep(self.delay);
                    }
                    attempt += 1;
                }
                _ => return (result, attempt),
            }
        }
    }
}
