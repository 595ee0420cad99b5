//! Fixed-capacity ring buffer over the last `m` analysis outcomes.

/// Sliding history of per-tick presence decisions, oldest evicted first.
///
/// Length is always exactly the capacity; the window starts pre-filled
/// with `false` so recording cannot begin before an actual detection.
pub struct PresenceWindow {
    slots: Box<[bool]>,
    head: usize,
}

impl PresenceWindow {
    /// Panics if `capacity` is zero; callers validate configuration
    /// before construction.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "presence window capacity must be at least 1");
        Self {
            slots: vec![false; capacity].into_boxed_slice(),
            head: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Record the newest outcome, evicting the oldest.
    pub fn push(&mut self, hit: bool) {
        self.slots[self.head] = hit;
        self.head = (self.head + 1) % self.slots.len();
    }

    /// OR over the whole window.
    pub fn any_hit(&self) -> bool {
        self.slots.iter().any(|&hit| hit)
    }
}
