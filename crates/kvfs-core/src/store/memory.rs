use dashmap::DashMap;

use super::KvStore;
use crate::error::StoreError;
use crate::id::Id;

/// Volatile [`KvStore`] backed by a concurrent hash map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<Id, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &Id) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.records.get(key).map(|v| v.clone()))
    }

    fn put(&self, key: &Id, value: &[u8]) -> Result<(), StoreError> {
        self.records.insert(*key, value.to_vec());
        Ok(())
    }
}
