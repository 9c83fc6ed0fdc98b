use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::timestamp::{RecordTimestampExtractor, TimestampExtractor, WallclockTimestampExtractor};

const ENV_STREAMS_CONFIG_OBJ: &str = "STREAMS_CONFIG_OBJECT";
const DEFAULT_BUFFERED_RECORDS_PER_PARTITION: usize = 1000;
const DEFAULT_STATE_DIR: &str = "/tmp/streams";

/// Which [TimestampExtractor] stamps incoming records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimestampExtractorKind {
    #[default]
    Record,
    Wallclock,
}

impl TimestampExtractorKind {
    pub(crate) fn extractor(&self) -> Arc<dyn TimestampExtractor> {
        match self {
            TimestampExtractorKind::Record => Arc::new(RecordTimestampExtractor),
            TimestampExtractorKind::Wallclock => Arc::new(WallclockTimestampExtractor),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamsConfig {
    pub application_id: String,
    /// Number of buffered records per partition above which fetching is paused.
    #[serde(default = "default_buffered_records_per_partition")]
    pub buffered_records_per_partition: usize,
    /// Root directory of the per-task state directories.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default)]
    pub timestamp_extractor: TimestampExtractorKind,
}

fn default_buffered_records_per_partition() -> usize {
    DEFAULT_BUFFERED_RECORDS_PER_PARTITION
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_DIR)
}

impl StreamsConfig {
    pub fn new(application_id: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            buffered_records_per_partition: DEFAULT_BUFFERED_RECORDS_PER_PARTITION,
            state_dir: default_state_dir(),
            timestamp_extractor: TimestampExtractorKind::default(),
        }
    }

    /// Loads the config from a base64 encoded JSON object.
    pub fn load(config_obj: String) -> Result<Self> {
        let decoded = BASE64_STANDARD
            .decode(config_obj.as_bytes())
            .map_err(|e| Error::Config(format!("Failed to decode streams config: {:?}", e)))?;

        let config: StreamsConfig = serde_json::from_slice(&decoded)
            .map_err(|e| Error::Config(format!("Failed to parse streams config: {:?}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self> {
        let obj = env::var(ENV_STREAMS_CONFIG_OBJ)
            .map_err(|_| Error::Config(format!("{ENV_STREAMS_CONFIG_OBJ} is not set")))?;
        Self::load(obj)
    }

    pub fn validate(&self) -> Result<()> {
        if self.application_id.trim().is_empty() {
            return Err(Error::Config("applicationId must not be empty".to_string()));
        }
        if self.buffered_records_per_partition == 0 {
            return Err(Error::Config(
                "bufferedRecordsPerPartition must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode(value: serde_json::Value) -> String {
        BASE64_STANDARD.encode(value.to_string())
    }

    #[test]
    fn test_load_with_defaults() {
        let config = StreamsConfig::load(encode(json!({ "applicationId": "word-count" }))).unwrap();
        assert_eq!(config, StreamsConfig::new("word-count"));
        assert_eq!(config.buffered_records_per_partition, 1000);
        assert_eq!(config.state_dir, PathBuf::from("/tmp/streams"));
    }

    #[test]
    fn test_load_full() {
        let config = StreamsConfig::load(encode(json!({
            "applicationId": "word-count",
            "bufferedRecordsPerPartition": 10,
            "stateDir": "/var/lib/streams",
            "timestampExtractor": "wallclock"
        })))
        .unwrap();
        assert_eq!(config.buffered_records_per_partition, 10);
        assert_eq!(config.state_dir, PathBuf::from("/var/lib/streams"));
        assert_eq!(config.timestamp_extractor, TimestampExtractorKind::Wallclock);
    }

    #[test]
    fn test_load_invalid() {
        assert!(matches!(
            StreamsConfig::load("not base64!".to_string()),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            StreamsConfig::load(encode(json!({ "bufferedRecordsPerPartition": 10 }))),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            StreamsConfig::load(encode(json!({
                "applicationId": "word-count",
                "bufferedRecordsPerPartition": 0
            }))),
            Err(Error::Config(_))
        ));
    }
}
