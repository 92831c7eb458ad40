use std::time::Duration;

use moka::sync::Cache;

/// Sliding-window "seen player" cache.
///
/// A player id stays marked for the configured window after its last write,
/// then expires and counts as new again. The cache is bounded: once
/// `max_entries` is exceeded, the least valuable entries are evicted, which
/// keeps memory flat under unbounded key cardinality at the cost of possibly
/// re-counting an evicted player inside its window.
pub struct SlidingWindowDedup {
    seen: Cache<String, ()>,
}

impl SlidingWindowDedup {
    pub fn new(window: Duration, max_entries: u64) -> Self {
        let seen = Cache::builder()
            .time_to_live(window)
            .max_capacity(max_entries)
            .build();
        Self { seen }
    }

    /// Returns true iff `player_id` was not already marked within the window,
    /// and marks it either way. The check-and-insert is a single atomic
    /// operation on the cache entry, so of N concurrent callers for the same
    /// key exactly one observes uniqueness. This is never a contains-then-
    /// insert pair.
    pub fn check_and_mark(&self, player_id: &str) -> bool {
        let entry = self.seen.entry_by_ref(player_id).or_insert(());
        if entry.is_fresh() {
            return true;
        }
        // Repeat sighting: re-insert to push the write expiry forward.
        self.seen.insert(player_id.to_owned(), ());
        false
    }

    /// Drops every entry immediately. Any previously seen player counts as
    /// new afterwards. Not used concurrently with traffic in normal
    /// operation.
    pub fn reset(&self) {
        self.seen.invalidate_all();
    }
}
