// Object storage for uploaded assets (problem images and the like).
// Not part of judging; the API uses it for upload, delete and presigned reads.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Lifetime of the read url handed back by `put`
pub const DEFAULT_PRESIGN_TTL: Duration = Duration::from_secs(900);

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid object key '{0}'")]
    InvalidKey(String),

    #[error("object '{0}' not found")]
    NotFound(String),

    #[error("signature does not match")]
    InvalidSignature,

    #[error("presigned url expired")]
    Expired,

    #[error("presign ttl of {0}s is out of range")]
    InvalidTtl(u64),

    #[error("signing key rejected: {0}")]
    SigningKey(String),

    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        folder: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<StoredObject, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    fn presign(&self, key: &str, ttl: Duration) -> Result<String, StorageError>;
}

/// `{folder}/{timestamp}-{random}{extension}`
pub fn object_key(folder: &str, extension: &str, now: DateTime<Utc>) -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}/{}-{}{}",
        folder.trim_matches('/'),
        now.timestamp_millis(),
        &random[..12],
        extension
    )
}

pub fn extension_for(content_type: &str) -> &'static str {
    match content_type.split(';').next().unwrap_or("").trim() {
        "image/png" => ".png",
        "image/jpeg" | "image/jpg" => ".jpg",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "image/svg+xml" => ".svg",
        _ => ".bin",
    }
}

fn validate_key(key: &str) -> Result<&Path, StorageError> {
    let path = Path::new(key);
    let clean = !key.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if clean {
        Ok(path)
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

/// Filesystem-backed store. Read urls are signed with HMAC-SHA256 over key and expiry.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
    public_url: String,
    signing_key: String,
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>, public_url: &str, signing_key: &str) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.trim_end_matches('/').to_string(),
            signing_key: signing_key.to_string(),
        }
    }

    fn mac(&self, key: &str, expires: i64) -> Result<HmacSha256, StorageError> {
        let mut mac = HmacSha256::new_from_slice(self.signing_key.as_bytes())
            .map_err(|e| StorageError::SigningKey(e.to_string()))?;
        mac.update(key.as_bytes());
        mac.update(b":");
        mac.update(expires.to_string().as_bytes());
        Ok(mac)
    }

    fn signature(&self, key: &str, expires: i64) -> Result<String, StorageError> {
        Ok(hex::encode(self.mac(key, expires)?.finalize().into_bytes()))
    }

    fn presign_at(
        &self,
        key: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, StorageError> {
        validate_key(key)?;
        let expires = i64::try_from(ttl.as_secs())
            .ok()
            .and_then(|secs| now.timestamp().checked_add(secs))
            .ok_or(StorageError::InvalidTtl(ttl.as_secs()))?;
        Ok(format!(
            "{}/{}?expires={}&signature={}",
            self.public_url,
            key,
            expires,
            self.signature(key, expires)?
        ))
    }

    /// Read an object through a presigned url's query parameters.
    pub async fn read_signed(
        &self,
        key: &str,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<u8>, StorageError> {
        let path = validate_key(key)?;
        let provided = hex::decode(signature).map_err(|_| StorageError::InvalidSignature)?;
        self.mac(key, expires)?
            .verify_slice(&provided)
            .map_err(|_| StorageError::InvalidSignature)?;
        if now.timestamp() > expires {
            return Err(StorageError::Expired);
        }
        match tokio::fs::read(self.root.join(path)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ObjectStore for DiskStore {
    async fn put(
        &self,
        folder: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        let key = object_key(folder, extension_for(content_type), Utc::now());
        let path = self.root.join(validate_key(&key)?);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        debug!(key = %key, size = bytes.len(), "Stored object");

        Ok(StoredObject {
            url: self.presign(&key, DEFAULT_PRESIGN_TTL)?,
            key,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.root.join(validate_key(key)?);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn presign(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        self.presign_at(key, ttl, Utc::now())
    }
}
