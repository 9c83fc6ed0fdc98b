//! Local state of a task. Stages register their [StateStore]s while they are initialized; logged
//! stores are rebuilt from their changelog partition before the task starts processing. On close
//! the manager writes an [OffsetCheckpoint] so the next incarnation of the task only replays the
//! changelog from where this one stopped.

use std::any::Any;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, error, info};

use crate::client::RestoreConsumer;
use crate::error::{Error, Result};
use crate::record::TopicPartition;
use crate::task::TaskId;

mod checkpoint;
pub use checkpoint::OffsetCheckpoint;

mod memory;
pub use memory::InMemoryKeyValueStore;

pub trait StateStore: Any + Send {
    fn name(&self) -> &str;

    /// Whether the store keeps its data on disk across restarts.
    fn persistent(&self) -> bool;

    fn flush(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    /// Applies one changelog record while the store is restored.
    fn restore(&mut self, key: &Bytes, value: &Bytes) -> Result<()>;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct RegisteredStore {
    store: Box<dyn StateStore>,
    /// Changelog partition of a logged store.
    changelog: Option<TopicPartition>,
}

pub struct ProcessorStateManager {
    task_id: TaskId,
    base_dir: PathBuf,
    stores: Vec<RegisteredStore>,
    restore_consumer: Box<dyn RestoreConsumer>,
    checkpoint: OffsetCheckpoint,
    /// Offsets read from the checkpoint file when the manager was created.
    checkpointed_offsets: HashMap<TopicPartition, i64>,
    /// Offset up to which every logged store was restored.
    restored_offsets: HashMap<TopicPartition, i64>,
}

impl ProcessorStateManager {
    /// Opens the state directory of the task and loads its checkpoint. The checkpoint file is
    /// deleted right away, it is rewritten by a clean close; after a crash the changelogs are
    /// replayed from the beginning.
    pub fn new(
        task_id: TaskId,
        base_dir: impl Into<PathBuf>,
        restore_consumer: Box<dyn RestoreConsumer>,
    ) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).map_err(|e| {
            Error::Io(format!(
                "failed to create state directory {}: {e}",
                base_dir.display()
            ))
        })?;

        let checkpoint = OffsetCheckpoint::new(base_dir.join(checkpoint::CHECKPOINT_FILE_NAME));
        let checkpointed_offsets = checkpoint.read()?;
        checkpoint.delete()?;

        Ok(Self {
            task_id,
            base_dir,
            stores: Vec::new(),
            restore_consumer,
            checkpoint,
            checkpointed_offsets,
            restored_offsets: HashMap::new(),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Adds the store to the task and restores it from its changelog if it is logged. The
    /// changelog of a store is the topic named after the store, partition is the task id.
    pub fn register(&mut self, mut store: Box<dyn StateStore>, logged: bool) -> Result<()> {
        let name = store.name().to_string();
        if self.stores.iter().any(|s| s.store.name() == name) {
            return Err(Error::IllegalState(format!(
                "store {name} is already registered"
            )));
        }

        let changelog = if logged {
            let partition = TopicPartition::new(name.clone(), self.task_id.partition());
            self.restore(store.as_mut(), &partition)?;
            Some(partition)
        } else {
            None
        };

        debug!(task_id = %self.task_id, store = %name, logged, "Registered state store");
        self.stores.push(RegisteredStore { store, changelog });
        Ok(())
    }

    fn restore(&mut self, store: &mut dyn StateStore, partition: &TopicPartition) -> Result<()> {
        let end_offset = self.restore_consumer.end_offset(partition)?;
        let mut offset = self
            .checkpointed_offsets
            .get(partition)
            .copied()
            .unwrap_or(0);
        let start_offset = offset;

        while offset < end_offset {
            let records = self.restore_consumer.fetch(partition, offset)?;
            let fetched_from = offset;
            for record in records
                .iter()
                .filter(|r| r.offset >= fetched_from && r.offset < end_offset)
            {
                store.restore(&record.key, &record.value)?;
                offset = record.offset + 1;
            }
            if offset == fetched_from {
                return Err(Error::StateStore(format!(
                    "changelog {partition} ended at {offset} before its end offset {end_offset}"
                )));
            }
        }

        info!(
            task_id = %self.task_id,
            store = store.name(),
            %partition,
            restored = offset - start_offset,
            "Restored state store from changelog"
        );
        self.restored_offsets.insert(partition.clone(), offset);
        Ok(())
    }

    pub fn store_mut(&mut self, name: &str) -> Option<&mut dyn StateStore> {
        self.stores
            .iter_mut()
            .find(|s| s.store.name() == name)
            .map(|s| s.store.as_mut())
    }

    pub fn flush(&mut self) -> Result<()> {
        for registered in &mut self.stores {
            registered.store.flush()?;
        }
        Ok(())
    }

    /// Flushes and closes every store, even if some of them fail, and checkpoints the changelog
    /// offsets of the persistent logged stores. `produced_offsets` are the last acknowledged
    /// offsets of the task's output, including the changelog writes. Returns the last failure.
    pub fn close(&mut self, produced_offsets: &HashMap<TopicPartition, i64>) -> Result<()> {
        let mut last_error = None;
        let mut checkpoint = HashMap::new();

        for registered in &mut self.stores {
            let name = registered.store.name().to_string();
            if let Err(e) = registered
                .store
                .flush()
                .and_then(|_| registered.store.close())
            {
                error!(task_id = %self.task_id, store = %name, ?e, "Failed to close state store");
                last_error = Some(e);
                continue;
            }

            let Some(partition) = &registered.changelog else {
                continue;
            };
            if !registered.store.persistent() {
                continue;
            }
            let offset = produced_offsets
                .get(partition)
                .map(|offset| offset + 1)
                .or_else(|| self.restored_offsets.get(partition).copied());
            if let Some(offset) = offset {
                checkpoint.insert(partition.clone(), offset);
            }
        }

        if !checkpoint.is_empty() {
            if let Err(e) = self.checkpoint.write(&checkpoint) {
                error!(task_id = %self.task_id, ?e, "Failed to write the offset checkpoint");
                last_error = Some(e);
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
