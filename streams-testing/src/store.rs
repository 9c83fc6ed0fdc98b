use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use streams_core::state::StateStore;

use crate::call_log::CallLog;
use crate::error::TestingError;
use crate::error_injector::ErrorInjector;

/// State store whose entries stay readable by the test after the task took ownership of it.
/// Clones share the entries.
///
/// Calls are logged as `store.flush:<name>` and `store.close:<name>`.
#[derive(Debug, Clone)]
pub struct MockStateStore {
    name: String,
    persistent: bool,
    log: CallLog,
    injector: Arc<ErrorInjector>,
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MockStateStore {
    pub fn new(name: impl Into<String>, log: CallLog) -> Self {
        Self {
            name: name.into(),
            persistent: false,
            log,
            injector: Arc::default(),
            entries: Arc::default(),
        }
    }

    /// Makes the store report itself as persistent, so its changelog offset gets checkpointed.
    pub fn with_persistence(mut self) -> Self {
        self.persistent = true;
        self
    }

    pub fn injector(&self) -> &ErrorInjector {
        &self.injector
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    pub fn put(&self, key: &str, value: &str) {
        self.entries.lock().insert(key.to_string(), value.to_string());
    }

    pub fn entries(&self) -> BTreeMap<String, String> {
        self.entries.lock().clone()
    }
}

impl StateStore for MockStateStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn persistent(&self) -> bool {
        self.persistent
    }

    fn flush(&mut self) -> streams_core::Result<()> {
        self.log.record(format!("store.flush:{}", self.name));
        if self.injector.should_fail_flush() {
            return Err(TestingError::StateStore(format!("flush {}", self.name)).into());
        }
        Ok(())
    }

    fn close(&mut self) -> streams_core::Result<()> {
        self.log.record(format!("store.close:{}", self.name));
        if self.injector.should_fail_close() {
            return Err(TestingError::StateStore(format!("close {}", self.name)).into());
        }
        Ok(())
    }

    /// An empty value is a delete.
    fn restore(&mut self, key: &Bytes, value: &Bytes) -> streams_core::Result<()> {
        let key = String::from_utf8_lossy(key).into_owned();
        let mut entries = self.entries.lock();
        if value.is_empty() {
            entries.remove(&key);
        } else {
            entries.insert(key, String::from_utf8_lossy(value).into_owned());
        }
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_shared_with_clone() {
        let log = CallLog::new();
        let mut store = MockStateStore::new("counts", log.clone());
        let handle = store.clone();

        store
            .restore(&Bytes::from_static(b"a"), &Bytes::from_static(b"1"))
            .unwrap();
        store.put("b", "2");
        store
            .restore(&Bytes::from_static(b"b"), &Bytes::new())
            .unwrap();
        assert_eq!(handle.get("a"), Some("1".to_string()));
        assert_eq!(handle.get("b"), None);

        store.injector().fail_closes(1);
        assert!(matches!(
            store.close(),
            Err(streams_core::Error::StateStore(_))
        ));
        store.flush().unwrap();
        assert_eq!(log.entries(), vec!["store.close:counts", "store.flush:counts"]);
        assert!(!store.persistent);
        assert!(store.clone().with_persistence().persistent);
    }
}
