//! Cooperative cancellation via shared atomic flags

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Granularity of cancellable sleeps and blocking waits
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Cancellation token shared between the caller, the coordinator and its threads.
///
/// A token observes its own flag and the flags of every token it was derived
/// from via [`child`](CancelToken::child), so cancelling a parent cancels all
/// children while a child can be cancelled on its own.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    ancestors: Vec<Arc<AtomicBool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a token that is cancelled when either it or `self` is cancelled
    pub fn child(&self) -> Self {
        let mut ancestors = self.ancestors.clone();
        ancestors.push(self.flag.clone());
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            ancestors,
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
            || self.ancestors.iter().any(|f| f.load(Ordering::Relaxed))
    }

    /// Raw flag for signal handlers (`signal_hook::flag::register`)
    pub fn flag(&self) -> Arc<AtomicBool> {
        self.flag.clone()
    }

    /// Sleep for `duration`, waking early on cancellation.
    ///
    /// Returns `false` if the token was cancelled before the full duration elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }
}
