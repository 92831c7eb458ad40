use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use crate::dedup::SlidingWindowDedup;
use crate::event::LoginEvent;
use crate::metrics_consts::{
    RECORDS_AGGREGATED, RECORDS_DUPLICATE, RECORDS_MALFORMED, RECORDS_RECEIVED,
};
use crate::store::AggregationStore;

/// What happened to one raw record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// First sighting of the player within the dedup window; aggregated.
    Aggregated,
    /// Player already seen within the window; dropped.
    Duplicate,
    /// Payload failed both schema attempts; dropped.
    Malformed,
}

/// Applies parse → dedup → aggregate to raw records. This is the single
/// point of truth for "first time we've seen this player in the window";
/// racing callers for the same player are serialized by the dedup cache's
/// atomic check-and-insert, not by any lock held here.
pub struct RecordProcessor {
    dedup: Arc<SlidingWindowDedup>,
    store: Arc<AggregationStore>,
}

impl RecordProcessor {
    pub fn new(dedup: Arc<SlidingWindowDedup>, store: Arc<AggregationStore>) -> Self {
        Self { dedup, store }
    }

    pub fn handle(&self, raw: &[u8]) -> RecordOutcome {
        counter!(RECORDS_RECEIVED).increment(1);

        let event = match LoginEvent::parse(raw) {
            Ok(event) => event,
            Err(err) => {
                // Malformed input is not transient; drop without retry.
                warn!("dropping malformed record: {err}");
                counter!(RECORDS_MALFORMED).increment(1);
                return RecordOutcome::Malformed;
            }
        };

        if !self.dedup.check_and_mark(&event.player_id) {
            debug!(player_id = %event.player_id, "duplicate login ignored");
            counter!(RECORDS_DUPLICATE).increment(1);
            return RecordOutcome::Duplicate;
        }

        self.store.record_global_unique(&event.player_id);
        if let Some(country) = &event.country {
            self.store.record_country_unique(country, &event.player_id);
        }
        debug!(player_id = %event.player_id, schema = ?event.schema, "unique login aggregated");
        counter!(RECORDS_AGGREGATED).increment(1);
        RecordOutcome::Aggregated
    }
}
