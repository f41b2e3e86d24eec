use std::sync::atomic::{AtomicI64, Ordering};

/// Allocates `seq` values for the messages one session sends.
#[derive(Debug)]
pub struct SequenceCounter {
    next: AtomicI64,
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self {
            next: AtomicI64::new(1),
        }
    }

    /// Returns the next sequence number, starting at 1.
    pub fn next(&self) -> i64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}
