//! Lock-free work queue for distributing harvest windows across workers

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Lock-free work queue handing each item to exactly one worker.
///
/// Workers call [`next()`](WorkQueue::next) to claim the next item, so no two
/// workers ever hold the same item. [`stop()`](WorkQueue::stop) drains the
/// queue early when the run must end (outage, shutdown).
pub struct WorkQueue<S> {
    items: Vec<S>,
    cursor: AtomicUsize,
    stopped: AtomicBool,
}

impl<S> WorkQueue<S> {
    /// Create queue from all items, handed out in order
    pub fn new(items: Vec<S>) -> Self {
        Self {
            items,
            cursor: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
        }
    }

    /// Claim the next item; `None` once exhausted or stopped
    pub fn next(&self) -> Option<&S> {
        if self.stopped.load(Ordering::Acquire) {
            return None;
        }
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.items.get(i)
    }

    /// Stop handing out items. Items already claimed are unaffected.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// Total items in queue
    pub fn total(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hands_out_in_order() {
        let q = WorkQueue::new(vec![1, 2, 3]);
        assert_eq!(q.total(), 3);
        assert_eq!(q.next(), Some(&1));
        assert_eq!(q.next(), Some(&2));
        assert_eq!(q.next(), Some(&3));
        assert_eq!(q.next(), None);
    }

    #[test]
    fn stop_drains_remaining() {
        let q = WorkQueue::new(vec!["a", "b", "c"]);
        assert_eq!(q.next(), Some(&"a"));
        q.stop();
        assert_eq!(q.next(), None);
    }

    #[test]
    fn each_item_claimed_once_across_threads() {
        let q = WorkQueue::new((0..100).collect::<Vec<_>>());
        let claimed = std::sync::Mutex::new(Vec::new());
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    while let Some(&i) = q.next() {
                        claimed.lock().unwrap().push(i);
                    }
                });
            }
        });
        let mut claimed = claimed.into_inner().unwrap();
        claimed.sort_unstable();
        assert_eq!(claimed, (0..100).collect::<Vec<_>>());
    }
}
