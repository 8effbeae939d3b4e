//! Request timeline
//!
//! Counts requests per rounded start-time slot. Rounding is floor-to-slot in
//! UTC and memoized per (timestamp, grouping) in the pass cache.

use crate::services::query_analyzer::analyzer::PassCache;
use crate::services::query_analyzer::models::{AnalyzedRecord, TimeGrouping, TimelineBucket};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub struct TimelineBuilder;

impl TimelineBuilder {
    /// Buckets ordered by start; records without a request time are left out
    pub fn build(
        records: &[&AnalyzedRecord],
        grouping: TimeGrouping,
        cache: &mut PassCache,
    ) -> Vec<TimelineBucket> {
        let mut slots: BTreeMap<i64, (u64, f64)> = BTreeMap::new();

        for record in records {
            let Some(time) = record.request_time else {
                continue;
            };
            let start = Self::round_down(time.timestamp_millis(), grouping, cache);
            let slot = slots.entry(start).or_insert((0, 0.0));
            slot.0 += 1;
            slot.1 += record.elapsed_ms;
        }

        slots
            .into_iter()
            .filter_map(|(start, (count, total))| {
                DateTime::<Utc>::from_timestamp_millis(start).map(|start| TimelineBucket {
                    start,
                    count,
                    total_elapsed_ms: (total * 100.0).round() / 100.0,
                })
            })
            .collect()
    }

    /// Slot start in epoch milliseconds
    pub fn round_down(timestamp_ms: i64, grouping: TimeGrouping, cache: &mut PassCache) -> i64 {
        *cache.timestamps.get_or_insert_with((timestamp_ms, grouping), || {
            let step = grouping.bucket_millis();
            timestamp_ms.div_euclid(step) * step
        })
    }
}
