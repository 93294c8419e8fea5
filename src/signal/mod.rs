//! Cooperative shutdown (SIGTERM/SIGINT/SIGHUP)
//!
//! The signal handler only sets a flag. The daemon loop checks it:
//! 1. Before starting round work
//! 2. After round work, before sleeping
//! 3. Inside the sleep, every slice
//!
//! A build in progress is never interrupted; shutdown can take as long as
//! the longest running compile.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Granularity of the interruptible sleep
pub const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Shared shutdown flag
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    requested: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early only if shutdown is requested.
    pub fn sleep(&self, duration: Duration) -> SleepOutcome {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_requested() {
                return SleepOutcome::Interrupted {
                    remaining: deadline.saturating_duration_since(Instant::now()),
                };
            }
            let now = Instant::now();
            if now >= deadline {
                return SleepOutcome::Completed;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }

    /// Install the process signal handler.
    ///
    /// Must be called once at program startup.
    pub fn install_handler(&self) -> Result<(), ctrlc::Error> {
        let token = self.clone();
        ctrlc::set_handler(move || token.request())
    }
}

/// How an interruptible sleep ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepOutcome {
    Completed,
    Interrupted { remaining: Duration },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_token_initial() {
        let token = ShutdownToken::new();
        assert!(!token.is_requested());
    }

    #[test]
    fn test_clones_share_flag() {
        let token = ShutdownToken::new();
        let handler_side = token.clone();
        handler_side.request();
        assert!(token.is_requested());
    }

    #[test]
    fn test_sleep_completes() {
        let token = ShutdownToken::new();
        let start = Instant::now();
        assert_eq!(token.sleep(Duration::from_millis(250)), SleepOutcome::Completed);
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[test]
    fn test_sleep_interrupted_early() {
        let token = ShutdownToken::new();
        let signaller = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            signaller.request();
        });

        let start = Instant::now();
        let outcome = token.sleep(Duration::from_secs(10));
        handle.join().unwrap();

        assert!(start.elapsed() < Duration::from_secs(2));
        match outcome {
            SleepOutcome::Interrupted { remaining } => {
                assert!(remaining > Duration::from_secs(8));
            }
            other => panic!("expected interruption, got {:?}", other),
        }
    }

    #[test]
    fn test_sleep_returns_immediately_when_already_requested() {
        let token = ShutdownToken::new();
        token.request();
        assert!(matches!(
            token.sleep(Duration::from_secs(5)),
            SleepOutcome::Interrupted { .. }
        ));
    }
}
