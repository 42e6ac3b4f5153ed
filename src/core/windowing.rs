//! Sliding window over the most recent event records.
//!
//! The filter retains the last K records (K between 1 and 10) and hands out
//! immutable snapshots for presentation. It defines no aggregation of its
//! own; [`WindowSnapshot::majority`] is a read-only view over a snapshot.

use crate::core::decoder::EventRecord;
use crate::error::{validate_window_length, ValidationError};
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;

/// Smallest supported window length.
pub const MIN_WINDOW_LENGTH: usize = 1;
/// Largest supported window length.
pub const MAX_WINDOW_LENGTH: usize = 10;

/// Immutable point-in-time copy of the window, oldest record first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowSnapshot {
    /// Window length in force when the snapshot was taken
    pub capacity: usize,
    /// Retained records, oldest first
    pub records: Vec<Arc<EventRecord>>,
}

impl WindowSnapshot {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sequence numbers of the retained records, oldest first.
    pub fn sequences(&self) -> Vec<u64> {
        self.records.iter().map(|r| r.sequence).collect()
    }

    /// Most recent record in the window.
    pub fn latest(&self) -> Option<&Arc<EventRecord>> {
        self.records.last()
    }

    /// Most frequent value of `field` across the window, with its count.
    ///
    /// Ties go to the value seen most recently. Records without the field
    /// are skipped.
    pub fn majority(&self, field: &str) -> Option<(Value, usize)> {
        // (value, count, position of last occurrence)
        let mut tally: Vec<(&Value, usize, usize)> = Vec::new();

        for (position, record) in self.records.iter().enumerate() {
            let Some(value) = record.field(field) else {
                continue;
            };
            match tally.iter_mut().find(|(seen, _, _)| *seen == value) {
                Some(entry) => {
                    entry.1 += 1;
                    entry.2 = position;
                }
                None => tally.push((value, 1, position)),
            }
        }

        tally
            .into_iter()
            .max_by_key(|(_, count, last)| (*count, *last))
            .map(|(value, count, _)| (value.clone(), count))
    }
}

/// Fixed-capacity FIFO of the most recent records.
#[derive(Debug)]
pub struct SlidingWindowFilter {
    /// Maximum number of retained records
    capacity: usize,
    /// Retained records, oldest at the front
    records: VecDeque<Arc<EventRecord>>,
}

impl SlidingWindowFilter {
    /// Create a filter with the given window length.
    pub fn new(capacity: usize) -> Result<Self, ValidationError> {
        validate_window_length(capacity)?;
        Ok(Self {
            capacity,
            records: VecDeque::with_capacity(capacity),
        })
    }

    /// Change the window length, evicting the oldest excess records at once.
    ///
    /// The newest record always survives a shrink since K is at least 1.
    pub fn configure(&mut self, capacity: usize) -> Result<WindowSnapshot, ValidationError> {
        validate_window_length(capacity)?;
        self.capacity = capacity;
        self.trim();
        Ok(self.snapshot())
    }

    /// Append a record and return the resulting window.
    pub fn push(&mut self, record: Arc<EventRecord>) -> WindowSnapshot {
        self.records.push_back(record);
        self.trim();
        self.snapshot()
    }

    /// Copy the current window.
    pub fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            capacity: self.capacity,
            records: self.records.iter().cloned().collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    fn trim(&mut self) {
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::{json, Map};

    fn record(sequence: u64, classification: Value) -> Arc<EventRecord> {
        let mut fields = Map::new();
        fields.insert("ModelNumber".to_string(), json!(0));
        fields.insert("Classification".to_string(), classification);
        Arc::new(EventRecord {
            sequence,
            fields,
            frame_index: sequence,
            received_at: Utc::now(),
        })
    }

    #[test]
    fn test_oldest_evicted_first() {
        let mut filter = SlidingWindowFilter::new(3).unwrap();
        let mut last = None;
        for seq in 0..4 {
            last = Some(filter.push(record(seq, json!(seq))));
        }
        assert_eq!(last.unwrap().sequences(), vec![1, 2, 3]);
    }

    #[test]
    fn test_length_bounded_after_every_push() {
        for capacity in MIN_WINDOW_LENGTH..=MAX_WINDOW_LENGTH {
            let mut filter = SlidingWindowFilter::new(capacity).unwrap();
            for seq in 0..25 {
                let snapshot = filter.push(record(seq, json!(1)));
                assert!(snapshot.len() <= capacity);
                assert_eq!(snapshot.latest().unwrap().sequence, seq);
            }
        }
    }

    #[test]
    fn test_shrink_trims_immediately_and_keeps_newest() {
        let mut filter = SlidingWindowFilter::new(5).unwrap();
        for seq in 0..5 {
            filter.push(record(seq, json!(seq)));
        }

        let snapshot = filter.configure(2).unwrap();
        assert_eq!(snapshot.sequences(), vec![3, 4]);
        assert_eq!(filter.len(), 2);

        let snapshot = filter.configure(1).unwrap();
        assert_eq!(snapshot.sequences(), vec![4]);
    }

    #[test]
    fn test_grow_keeps_existing_records() {
        let mut filter = SlidingWindowFilter::new(2).unwrap();
        for seq in 0..4 {
            filter.push(record(seq, json!(seq)));
        }
        filter.configure(4).unwrap();
        assert_eq!(filter.snapshot().sequences(), vec![2, 3]);
        let snapshot = filter.push(record(4, json!(4)));
        assert_eq!(snapshot.sequences(), vec![2, 3, 4]);
    }

    #[test]
    fn test_out_of_range_lengths_rejected() {
        assert!(SlidingWindowFilter::new(0).is_err());
        assert!(SlidingWindowFilter::new(11).is_err());

        let mut filter = SlidingWindowFilter::new(3).unwrap();
        assert!(filter.configure(0).is_err());
        assert_eq!(filter.capacity(), 3);
    }

    #[test]
    fn test_snapshot_is_detached_from_filter() {
        let mut filter = SlidingWindowFilter::new(2).unwrap();
        let before = filter.push(record(0, json!("a")));
        filter.push(record(1, json!("b")));
        filter.push(record(2, json!("c")));
        assert_eq!(before.sequences(), vec![0]);
    }

    #[test]
    fn test_majority_prefers_count_then_recency() {
        let mut filter = SlidingWindowFilter::new(5).unwrap();
        filter.push(record(0, json!("wave")));
        filter.push(record(1, json!("idle")));
        filter.push(record(2, json!("wave")));
        let snapshot = filter.push(record(3, json!("idle")));

        // two each; "idle" was seen last
        assert_eq!(
            snapshot.majority("Classification"),
            Some((json!("idle"), 2))
        );

        let snapshot = filter.push(record(4, json!("wave")));
        assert_eq!(
            snapshot.majority("Classification"),
            Some((json!("wave"), 3))
        );
        assert_eq!(snapshot.majority("Missing"), None);
    }
}
