//! Event time assigned to every record when it is buffered. The merge in
//! [PartitionGroup](crate::partition_group::PartitionGroup) and the punctuation schedule are
//! both driven by these timestamps.

use chrono::Utc;

use crate::record::ConsumerRecord;

pub trait TimestampExtractor: Send + Sync {
    /// Returns the event time of the record in epoch millis.
    fn extract(&self, record: &ConsumerRecord) -> i64;
}

/// Uses the timestamp carried by the record itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordTimestampExtractor;

impl TimestampExtractor for RecordTimestampExtractor {
    fn extract(&self, record: &ConsumerRecord) -> i64 {
        record.timestamp
    }
}

/// Stamps records with the wall-clock time at which they are buffered.
#[derive(Debug, Clone, Copy, Default)]
pub struct WallclockTimestampExtractor;

impl TimestampExtractor for WallclockTimestampExtractor {
    fn extract(&self, _record: &ConsumerRecord) -> i64 {
        Utc::now().timestamp_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn record(timestamp: i64) -> ConsumerRecord {
        ConsumerRecord {
            topic: "events".to_string(),
            partition: 0,
            offset: 0,
            timestamp,
            key: Bytes::new(),
            value: Bytes::new(),
        }
    }

    #[test]
    fn test_record_timestamp_extractor() {
        assert_eq!(RecordTimestampExtractor.extract(&record(42)), 42);
    }

    #[test]
    fn test_wallclock_timestamp_extractor() {
        let before = Utc::now().timestamp_millis();
        let stamped = WallclockTimestampExtractor.extract(&record(42));
        assert!(stamped >= before);
    }
}
