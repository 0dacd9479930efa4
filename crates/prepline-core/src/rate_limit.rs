//! Minimum spacing between outgoing requests.
//!
//! One limiter is shared by every fetcher in the process, so parallel
//! workers together stay under the API's published rate.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Enforces `min_delay` between the starts of consecutive requests.
#[derive(Debug)]
pub struct RateLimiter {
    min_delay: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last: Mutex::new(None),
        }
    }

    /// Block until a request may start, then claim the slot.
    ///
    /// The lock is held while sleeping so waiting callers queue up behind
    /// each other instead of all waking at once.
    pub fn acquire(&self) {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_delay {
                std::thread::sleep(self.min_delay - elapsed);
            }
        }
        *last = Some(Instant::now());
    }
}
