//! Offset checkpoint file of a task's state directory. It records, per changelog partition, the
//! offset up to which the local stores are known to be consistent, so a restart only replays the
//! changelog from there. Text format:
//! ```text
//! 0                       <- version
//! 2                       <- number of entries
//! counts 3 120            <- topic partition offset
//! totals 3 42
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::record::TopicPartition;

pub(crate) const CHECKPOINT_FILE_NAME: &str = ".checkpoint";
const VERSION: i32 = 0;

#[derive(Debug, Clone)]
pub struct OffsetCheckpoint {
    path: PathBuf,
}

impl OffsetCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically replaces the file with the given offsets.
    pub fn write(&self, offsets: &HashMap<TopicPartition, i64>) -> Result<()> {
        let mut entries: Vec<_> = offsets.iter().collect();
        entries.sort();

        let mut content = format!("{VERSION}\n{}\n", entries.len());
        for (partition, offset) in entries {
            content.push_str(&format!(
                "{} {} {}\n",
                partition.topic, partition.partition, offset
            ));
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Reads the offsets, an absent file means no checkpoint.
    pub fn read(&self) -> Result<HashMap<TopicPartition, i64>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };

        let mut lines = content.lines();
        let version: i32 = self.parse_line(lines.next(), "version")?;
        if version != VERSION {
            return Err(self.malformed(&format!("unknown version {version}")));
        }
        let expected: usize = self.parse_line(lines.next(), "entry count")?;

        let mut offsets = HashMap::with_capacity(expected);
        for line in lines.filter(|line| !line.trim().is_empty()) {
            let mut fields = line.split_whitespace();
            let (Some(topic), Some(partition), Some(offset), None) =
                (fields.next(), fields.next(), fields.next(), fields.next())
            else {
                return Err(self.malformed(&format!("invalid entry '{line}'")));
            };
            let partition = partition
                .parse()
                .map_err(|_| self.malformed(&format!("invalid partition in '{line}'")))?;
            let offset = offset
                .parse()
                .map_err(|_| self.malformed(&format!("invalid offset in '{line}'")))?;
            offsets.insert(TopicPartition::new(topic, partition), offset);
        }

        if offsets.len() != expected {
            return Err(self.malformed(&format!(
                "expected {expected} entries but found {}",
                offsets.len()
            )));
        }
        Ok(offsets)
    }

    pub fn delete(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn parse_line<T: std::str::FromStr>(&self, line: Option<&str>, what: &str) -> Result<T> {
        line.and_then(|line| line.trim().parse().ok())
            .ok_or_else(|| self.malformed(&format!("missing or invalid {what}")))
    }

    fn malformed(&self, reason: &str) -> Error {
        Error::Io(format!(
            "malformed checkpoint file {}: {reason}",
            self.path.display()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_delete() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = OffsetCheckpoint::new(dir.path().join(CHECKPOINT_FILE_NAME));
        assert!(checkpoint.read().unwrap().is_empty());

        let offsets = HashMap::from([
            (TopicPartition::new("totals", 3), 42),
            (TopicPartition::new("counts", 3), 120),
        ]);
        checkpoint.write(&offsets).unwrap();

        let content = fs::read_to_string(checkpoint.path()).unwrap();
        assert_eq!(content, "0\n2\ncounts 3 120\ntotals 3 42\n");
        assert_eq!(checkpoint.read().unwrap(), offsets);

        checkpoint.delete().unwrap();
        assert!(!checkpoint.path().exists());
        checkpoint.delete().unwrap();
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = OffsetCheckpoint::new(dir.path().join(CHECKPOINT_FILE_NAME));

        for content in [
            "1\n0\n",
            "0\n2\ncounts 3 120\n",
            "0\n1\ncounts three 120\n",
            "0\n1\ncounts 3\n",
            "",
        ] {
            fs::write(checkpoint.path(), content).unwrap();
            assert!(
                matches!(checkpoint.read(), Err(Error::Io(_))),
                "content {content:?} should be rejected"
            );
        }
    }
}
