//! In-memory storage backend

use async_trait::async_trait;
use bytes::Bytes;
use http::Response;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

use crate::backend::{validate_partition_name, CacheStore, EntryRecord};
use crate::error::StorageError;

struct MemoryPartition {
    name: String,
    entries: HashMap<String, (EntryRecord, Bytes)>,
}

/// In-memory storage backend
///
/// Partitions live for as long as the store does. Every operation takes the
/// lock once, which makes single-entry operations atomic.
#[derive(Default)]
pub struct MemoryStore {
    // Kept in creation order for `match_any`
    partitions: RwLock<Vec<MemoryPartition>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_partition(partitions: &mut Vec<MemoryPartition>, name: &str) -> usize {
        if let Some(idx) = partitions.iter().position(|p| p.name == name) {
            return idx;
        }
        debug!("Creating partition {}", name);
        partitions.push(MemoryPartition {
            name: name.to_string(),
            entries: HashMap::new(),
        });
        partitions.len() - 1
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn open(&self, partition: &str) -> Result<(), StorageError> {
        validate_partition_name(partition)?;
        let mut partitions = self.partitions.write();
        Self::ensure_partition(&mut partitions, partition);
        Ok(())
    }

    async fn has_partition(&self, partition: &str) -> Result<bool, StorageError> {
        Ok(self.partitions.read().iter().any(|p| p.name == partition))
    }

    async fn partitions(&self) -> Result<Vec<String>, StorageError> {
        Ok(self
            .partitions
            .read()
            .iter()
            .map(|p| p.name.clone())
            .collect())
    }

    async fn delete_partition(&self, partition: &str) -> Result<bool, StorageError> {
        let mut partitions = self.partitions.write();
        let before = partitions.len();
        partitions.retain(|p| p.name != partition);
        Ok(partitions.len() != before)
    }

    async fn get(
        &self,
        partition: &str,
        key: &str,
    ) -> Result<Option<Response<Bytes>>, StorageError> {
        let entry = {
            let partitions = self.partitions.read();
            partitions
                .iter()
                .find(|p| p.name == partition)
                .and_then(|p| p.entries.get(key).cloned())
        };

        match entry {
            Some((record, body)) => Ok(Some(record.into_response(body)?)),
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        partition: &str,
        key: &str,
        response: Response<Bytes>,
    ) -> Result<(), StorageError> {
        validate_partition_name(partition)?;
        let record = EntryRecord::from_response(key, &response);
        let body = response.into_body();

        let mut partitions = self.partitions.write();
        let idx = Self::ensure_partition(&mut partitions, partition);
        partitions[idx]
            .entries
            .insert(key.to_string(), (record, body));
        Ok(())
    }

    async fn delete(&self, partition: &str, key: &str) -> Result<bool, StorageError> {
        let mut partitions = self.partitions.write();
        Ok(partitions
            .iter_mut()
            .find(|p| p.name == partition)
            .is_some_and(|p| p.entries.remove(key).is_some()))
    }

    async fn keys(&self, partition: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .partitions
            .read()
            .iter()
            .find(|p| p.name == partition)
            .map(|p| p.entries.keys().cloned().collect())
            .unwrap_or_default())
    }
}
