use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use dashmap::{DashMap, DashSet};

/// One flush interval's worth of aggregation state. Writers insert through a
/// shared read guard into the concurrent sets; `drain` swaps the whole
/// generation out under the write guard.
#[derive(Default)]
struct Generation {
    global: DashSet<String>,
    by_country: DashMap<String, DashSet<String>>,
}

/// The member sets captured by one drain. Owned by the caller; counting
/// happens on this snapshot outside any lock shared with writers.
#[derive(Debug, Default)]
pub struct AggregateSnapshot {
    pub unique_global: HashSet<String>,
    pub unique_by_country: HashMap<String, HashSet<String>>,
}

impl From<Generation> for AggregateSnapshot {
    fn from(generation: Generation) -> Self {
        Self {
            unique_global: generation.global.into_iter().collect(),
            unique_by_country: generation
                .by_country
                .into_iter()
                .map(|(country, players)| (country, players.into_iter().collect()))
                .collect(),
        }
    }
}

/// Concurrent unique-login counters: a global unique-player set plus one set
/// per country. Mutated by arbitrarily many shard tasks, drained wholesale by
/// the output scheduler once per flush tick.
///
/// The lock discipline is what makes `drain` safe against concurrent writers:
/// every insert holds the read guard, so a writer is serialized against the
/// O(1) generation swap and its insert lands entirely in either the drained
/// snapshot or the next generation, never lost and never counted twice.
#[derive(Default)]
pub struct AggregationStore {
    current: RwLock<Generation>,
}

impl AggregationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert into the global unique set. Idempotent.
    pub fn record_global_unique(&self, player_id: &str) {
        let generation = self.current.read().expect("aggregation lock poisoned");
        generation.global.insert(player_id.to_owned());
    }

    /// Insert into one country's unique set. Idempotent.
    pub fn record_country_unique(&self, country: &str, player_id: &str) {
        let generation = self.current.read().expect("aggregation lock poisoned");
        generation
            .by_country
            .entry(country.to_owned())
            .or_default()
            .insert(player_id.to_owned());
    }

    /// Atomically capture the current member sets and clear the store in the
    /// same operation, by swapping in a fresh empty generation.
    pub fn drain(&self) -> AggregateSnapshot {
        let drained = {
            let mut generation = self.current.write().expect("aggregation lock poisoned");
            std::mem::take(&mut *generation)
        };
        AggregateSnapshot::from(drained)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn inserts_are_idempotent() {
        let store = AggregationStore::new();
        store.record_global_unique("p1");
        store.record_global_unique("p1");
        store.record_country_unique("US", "p1");
        store.record_country_unique("US", "p1");

        let snapshot = store.drain();
        assert_eq!(snapshot.unique_global.len(), 1);
        assert_eq!(snapshot.unique_by_country["US"].len(), 1);
    }

    #[test]
    fn drain_leaves_the_store_empty() {
        let store = AggregationStore::new();
        store.record_global_unique("p1");
        store.record_country_unique("US", "p1");

        let first = store.drain();
        assert_eq!(first.unique_global.len(), 1);

        let second = store.drain();
        assert!(second.unique_global.is_empty());
        assert!(second.unique_by_country.is_empty());
    }

    /// Every key inserted concurrently with repeated drains must end up in
    /// exactly one snapshot: never dropped, never double-counted.
    #[test]
    fn drain_conserves_concurrent_writes() {
        let store = Arc::new(AggregationStore::new());
        let writers = 8;
        let keys_per_writer = 1_000;

        let handles: Vec<_> = (0..writers)
            .map(|w| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for k in 0..keys_per_writer {
                        store.record_global_unique(&format!("player-{w}-{k}"));
                    }
                })
            })
            .collect();

        let mut snapshots = Vec::new();
        for _ in 0..20 {
            snapshots.push(store.drain());
            std::thread::yield_now();
        }

        for handle in handles {
            handle.join().expect("writer thread panicked");
        }
        snapshots.push(store.drain());

        let mut seen = HashSet::new();
        for snapshot in &snapshots {
            for key in &snapshot.unique_global {
                assert!(seen.insert(key.clone()), "{key} drained twice");
            }
        }
        assert_eq!(seen.len(), writers * keys_per_writer);
    }
}
