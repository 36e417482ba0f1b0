//! Cooperative shutdown.
//!
//! [`Shutdown`] is a cloneable cancellation token backed by a shared
//! `AtomicBool`. The binary hands the flag to the signal handler; the packet
//! loop and the sweeper check it at their poll points.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Granularity of [`Shutdown::sleep`].
const SLEEP_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared flag, for registration with a signal handler.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early once shutdown is triggered.
    ///
    /// Returns `true` if the full duration elapsed without shutdown.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_triggered() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_is_shared_between_clones() {
        let shutdown = Shutdown::new();
        let clone = shutdown.clone();
        assert!(!clone.is_triggered());

        shutdown.trigger();
        assert!(clone.is_triggered());
        assert!(shutdown.flag().load(Ordering::SeqCst));
    }

    #[test]
    fn test_sleep_completes_without_shutdown() {
        let shutdown = Shutdown::new();
        assert!(shutdown.sleep(Duration::from_millis(20)));
    }

    #[test]
    fn test_sleep_wakes_on_trigger() {
        let shutdown = Shutdown::new();
        let trigger = shutdown.clone();

        let start = Instant::now();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            trigger.trigger();
        });

        assert!(!shutdown.sleep(Duration::from_secs(30)));
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn test_flag_set_externally() {
        let shutdown = Shutdown::new();
        shutdown.flag().store(true, Ordering::SeqCst);
        assert!(!shutdown.sleep(Duration::from_secs(1)));
    }
}
