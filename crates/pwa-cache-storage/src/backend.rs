//! Cache store trait

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{HeaderValue, Response};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Partitioned response store
///
/// A store holds any number of named partitions, each mapping a request
/// identity to a response snapshot. Implementations must make single-entry
/// reads, writes and deletes atomic; nothing spans more than one entry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Open a partition, creating it if it does not exist
    async fn open(&self, partition: &str) -> Result<(), StorageError>;

    /// Check if a partition exists
    async fn has_partition(&self, partition: &str) -> Result<bool, StorageError>;

    /// List partition names in creation order
    async fn partitions(&self) -> Result<Vec<String>, StorageError>;

    /// Delete a partition together with all of its entries
    async fn delete_partition(&self, partition: &str) -> Result<bool, StorageError>;

    /// Read an entry from a single partition
    async fn get(&self, partition: &str, key: &str)
    -> Result<Option<Response<Bytes>>, StorageError>;

    /// Write or overwrite an entry, creating the partition when missing
    async fn put(
        &self,
        partition: &str,
        key: &str,
        response: Response<Bytes>,
    ) -> Result<(), StorageError>;

    /// Delete an entry
    async fn delete(&self, partition: &str, key: &str) -> Result<bool, StorageError>;

    /// List the keys stored in a partition
    async fn keys(&self, partition: &str) -> Result<Vec<String>, StorageError>;

    /// Look up a key across every partition, oldest partition first
    async fn match_any(&self, key: &str) -> Result<Option<Response<Bytes>>, StorageError> {
        for partition in self.partitions().await? {
            if let Some(response) = self.get(&partition, key).await? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }
}

/// Metadata stored alongside a cached response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    /// Request identity the entry is stored under
    pub key: String,
    /// HTTP status code of the stored response
    pub status: u16,
    /// Response headers in their original order
    pub headers: Vec<(String, StoredHeaderValue)>,
    /// When the entry was written
    pub stored_at: DateTime<Utc>,
}

impl EntryRecord {
    /// Capture the metadata of a response
    pub fn from_response(key: &str, response: &Response<Bytes>) -> Self {
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), StoredHeaderValue::from(value)))
            .collect();

        Self {
            key: key.to_string(),
            status: response.status().as_u16(),
            headers,
            stored_at: Utc::now(),
        }
    }

    /// Rebuild the response this record was captured from
    pub fn into_response(self, body: Bytes) -> Result<Response<Bytes>, StorageError> {
        let mut builder = Response::builder().status(self.status);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_bytes());
        }
        builder
            .body(body)
            .map_err(|e| StorageError::InvalidResponse(format!("{}: {}", self.key, e)))
    }
}

/// A header value as persisted
///
/// Visible ASCII is kept readable; anything else is stored as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredHeaderValue {
    Text(String),
    Bytes(Vec<u8>),
}

impl StoredHeaderValue {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            StoredHeaderValue::Text(text) => text.as_bytes(),
            StoredHeaderValue::Bytes(bytes) => bytes,
        }
    }
}

impl From<&HeaderValue> for StoredHeaderValue {
    fn from(value: &HeaderValue) -> Self {
        match value.to_str() {
            Ok(text) => StoredHeaderValue::Text(text.to_string()),
            Err(_) => StoredHeaderValue::Bytes(value.as_bytes().to_vec()),
        }
    }
}

/// Reject partition names no backend can store
pub fn validate_partition_name(partition: &str) -> Result<(), StorageError> {
    if partition.is_empty() || partition.chars().any(char::is_control) {
        return Err(StorageError::InvalidPartition(partition.to_string()));
    }
    Ok(())
}

/// Compute the hex SHA256 of a request identity
pub fn hash_key(key: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_roundtrip_keeps_status_and_headers() {
        let response = Response::builder()
            .status(203)
            .header("date", "Tue, 15 Nov 1994 08:12:31 GMT")
            .header("content-type", "text/css")
            .body(Bytes::from_static(b"body{}"))
            .unwrap();

        let record = EntryRecord::from_response("/app.css", &response);
        assert_eq!(record.key, "/app.css");
        assert_eq!(record.status, 203);
        assert_eq!(record.headers.len(), 2);

        let rebuilt = record.into_response(Bytes::from_static(b"body{}")).unwrap();
        assert_eq!(rebuilt.status().as_u16(), 203);
        assert_eq!(
            rebuilt.headers().get("date").unwrap(),
            "Tue, 15 Nov 1994 08:12:31 GMT"
        );
        assert_eq!(rebuilt.body().as_ref(), b"body{}");
    }

    #[test]
    fn test_record_keeps_opaque_header_bytes() {
        let opaque = HeaderValue::from_bytes(b"caf\xe9; filename=\xff").unwrap();
        let response = Response::builder()
            .status(200)
            .header("content-disposition", opaque.clone())
            .header("etag", "\"abc\"")
            .body(Bytes::new())
            .unwrap();

        let record = EntryRecord::from_response("/doc", &response);
        let json = serde_json::to_vec(&record).unwrap();
        let decoded: EntryRecord = serde_json::from_slice(&json).unwrap();
        assert_eq!(decoded, record);

        let rebuilt = decoded.into_response(Bytes::new()).unwrap();
        assert_eq!(rebuilt.headers().get("content-disposition").unwrap(), &opaque);
        assert_eq!(rebuilt.headers().get("etag").unwrap(), "\"abc\"");
    }

    #[test]
    fn test_validate_partition_name() {
        assert!(validate_partition_name("runtime-cache").is_ok());
        assert!(validate_partition_name("pre-cache-v2").is_ok());
        assert!(validate_partition_name("").is_err());
        assert!(validate_partition_name("bad\nname").is_err());
    }

    #[test]
    fn test_hash_key_is_stable() {
        assert_eq!(hash_key("/app.js"), hash_key("/app.js"));
        assert_ne!(hash_key("/app.js"), hash_key("/app.css"));
        assert_eq!(hash_key("/app.js").len(), 64);
    }
}
