//! Local disk storage backend

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::Response;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::{self, File};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use crate::backend::{hash_key, validate_partition_name, CacheStore, EntryRecord};
use crate::error::StorageError;

const MARKER_FILE: &str = "partition.json";
const ENTRY_EXTENSION: &str = "entry";

/// Distinguishes concurrent temp files for the same entry
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Marker written into every partition directory
#[derive(Debug, Serialize, Deserialize)]
struct PartitionMarker {
    name: String,
    created_at: DateTime<Utc>,
}

/// Local disk storage backend
///
/// Stores each partition in its own directory and each entry in one file:
/// `<base_path>/<hex(partition)>/<first 2 chars>/<sha256(key)>.entry`
///
/// An entry file holds a little-endian `u32` metadata length, the JSON
/// metadata record and then the raw body.
pub struct LocalStore {
    base_path: PathBuf,
}

impl LocalStore {
    /// Create a new local store rooted at `base_path`
    pub async fn new(base_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).await?;

        info!("Initialized local cache store at {:?}", base_path);

        Ok(Self { base_path })
    }

    fn partition_dir(&self, partition: &str) -> PathBuf {
        self.base_path.join(hex::encode(partition))
    }

    fn entry_path(&self, partition: &str, key: &str) -> PathBuf {
        let hash = hash_key(key);
        // Use first 2 characters for sharding
        self.partition_dir(partition)
            .join(&hash[..2])
            .join(format!("{}.{}", hash, ENTRY_EXTENSION))
    }

    async fn read_marker(dir: &Path) -> Result<Option<PartitionMarker>, StorageError> {
        match fs::read(dir.join(MARKER_FILE)).await {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Write a file by renaming a fully written temp file over it
    async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StorageError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let counter = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_path = path.with_file_name(format!(
            "{}.{}.{}.tmp",
            file_name,
            std::process::id(),
            counter
        ));

        fs::write(&temp_path, data).await?;
        if let Err(e) = fs::rename(&temp_path, path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::Io(e));
        }
        Ok(())
    }

    fn encode_entry(record: &EntryRecord, body: &[u8]) -> Result<Vec<u8>, StorageError> {
        let meta = serde_json::to_vec(record)?;
        let meta_len = u32::try_from(meta.len())
            .map_err(|_| StorageError::Corrupt(format!("metadata too large: {}", record.key)))?;

        let mut data = Vec::with_capacity(4 + meta.len() + body.len());
        data.extend_from_slice(&meta_len.to_le_bytes());
        data.extend_from_slice(&meta);
        data.extend_from_slice(body);
        Ok(data)
    }

    fn decode_entry(data: Bytes) -> Result<(EntryRecord, Bytes), StorageError> {
        if data.len() < 4 {
            return Err(StorageError::Corrupt("entry header truncated".to_string()));
        }
        let meta_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if data.len() < 4 + meta_len {
            return Err(StorageError::Corrupt("entry metadata truncated".to_string()));
        }

        let record: EntryRecord = serde_json::from_slice(&data[4..4 + meta_len])?;
        let body = data.slice(4 + meta_len..);
        Ok((record, body))
    }

    /// Read only the metadata record of an entry file
    async fn read_record(path: &Path) -> Result<EntryRecord, StorageError> {
        let mut file = File::open(path).await?;
        let meta_len = file.read_u32_le().await? as usize;
        let mut meta = vec![0u8; meta_len];
        file.read_exact(&mut meta).await?;
        Ok(serde_json::from_slice(&meta)?)
    }
}

#[async_trait]
impl CacheStore for LocalStore {
    async fn open(&self, partition: &str) -> Result<(), StorageError> {
        validate_partition_name(partition)?;
        let dir = self.partition_dir(partition);

        if Self::read_marker(&dir).await?.is_some() {
            return Ok(());
        }

        debug!("Creating partition {} at {:?}", partition, dir);
        fs::create_dir_all(&dir).await?;

        let marker = PartitionMarker {
            name: partition.to_string(),
            created_at: Utc::now(),
        };
        Self::write_atomic(&dir.join(MARKER_FILE), &serde_json::to_vec(&marker)?).await
    }

    async fn has_partition(&self, partition: &str) -> Result<bool, StorageError> {
        Ok(Self::read_marker(&self.partition_dir(partition))
            .await?
            .is_some())
    }

    async fn partitions(&self) -> Result<Vec<String>, StorageError> {
        let mut found = Vec::new();
        let mut dirs = fs::read_dir(&self.base_path).await?;

        while let Some(entry) = dirs.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            match Self::read_marker(&entry.path()).await {
                Ok(Some(marker)) => found.push((marker.created_at, marker.name)),
                // A directory without a marker is a partition being deleted or created
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable partition at {:?}: {}", entry.path(), e),
            }
        }

        found.sort();
        Ok(found.into_iter().map(|(_, name)| name).collect())
    }

    async fn delete_partition(&self, partition: &str) -> Result<bool, StorageError> {
        let dir = self.partition_dir(partition);
        debug!("Deleting partition {} at {:?}", partition, dir);

        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn get(
        &self,
        partition: &str,
        key: &str,
    ) -> Result<Option<Response<Bytes>>, StorageError> {
        let path = self.entry_path(partition, key);

        let data = match fs::read(&path).await {
            Ok(data) => Bytes::from(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let (record, body) = Self::decode_entry(data)?;
        if record.key != key {
            warn!("Hash collision between {} and {}", record.key, key);
            return Ok(None);
        }

        Ok(Some(record.into_response(body)?))
    }

    async fn put(
        &self,
        partition: &str,
        key: &str,
        response: Response<Bytes>,
    ) -> Result<(), StorageError> {
        self.open(partition).await?;

        let path = self.entry_path(partition, key);
        debug!("Writing entry {} to {:?}", key, path);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let record = EntryRecord::from_response(key, &response);
        let data = Self::encode_entry(&record, response.body())?;
        Self::write_atomic(&path, &data).await
    }

    async fn delete(&self, partition: &str, key: &str) -> Result<bool, StorageError> {
        let path = self.entry_path(partition, key);
        debug!("Deleting entry {} at {:?}", key, path);

        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn keys(&self, partition: &str) -> Result<Vec<String>, StorageError> {
        let dir = self.partition_dir(partition);
        let mut shards = match fs::read_dir(&dir).await {
            Ok(shards) => shards,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let mut keys = Vec::new();
        while let Some(shard) = shards.next_entry().await? {
            if !shard.file_type().await?.is_dir() {
                continue;
            }

            let mut files = fs::read_dir(shard.path()).await?;
            while let Some(file) = files.next_entry().await? {
                let path = file.path();
                if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                    continue;
                }
                match Self::read_record(&path).await {
                    Ok(record) => keys.push(record.key),
                    // Deleted between listing and reading
                    Err(StorageError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => warn!("Skipping unreadable entry {:?}: {}", path, e),
                }
            }
        }

        Ok(keys)
    }
}
