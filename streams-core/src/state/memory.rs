use std::any::Any;
use std::collections::BTreeMap;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::state::StateStore;

/// Key-value store kept in memory. It is not persistent, a restart rebuilds it from its
/// changelog.
#[derive(Debug)]
pub struct InMemoryKeyValueStore {
    name: String,
    entries: BTreeMap<Bytes, Bytes>,
    open: bool,
}

impl InMemoryKeyValueStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: BTreeMap::new(),
            open: true,
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<&Bytes> {
        self.entries.get(key)
    }

    pub fn put(&mut self, key: Bytes, value: Bytes) -> Result<()> {
        self.ensure_open()?;
        self.entries.insert(key, value);
        Ok(())
    }

    pub fn delete(&mut self, key: &[u8]) -> Result<Option<Bytes>> {
        self.ensure_open()?;
        Ok(self.entries.remove(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, &Bytes)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(Error::StateStore(format!("store {} is closed", self.name)))
        }
    }
}

impl StateStore for InMemoryKeyValueStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn persistent(&self) -> bool {
        false
    }

    fn flush(&mut self) -> Result<()> {
        self.ensure_open()
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }

    /// An empty value is a tombstone.
    fn restore(&mut self, key: &Bytes, value: &Bytes) -> Result<()> {
        if value.is_empty() {
            self.delete(key)?;
            Ok(())
        } else {
            self.put(key.clone(), value.clone())
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
