//! Backend traits
//!
//! `dt-core` does not depend on any cloud SDK. Object storage providers
//! implement [`ObjectStore`] in the `dt-cloud` crate and are registered in a
//! [`StoreRegistry`](crate::path::StoreRegistry) under their URI scheme.

use std::path::Path;

use async_trait::async_trait;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::path::CloudPath;

/// Metadata about a stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Object key
    pub key: String,

    /// Size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<Timestamp>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl ObjectInfo {
    /// Create metadata for a plain object
    pub fn file(key: impl Into<String>, size: i64) -> Self {
        Self {
            key: key.into(),
            size_bytes: Some(size),
            last_modified: None,
            etag: None,
            content_type: None,
        }
    }
}

/// Operations an object storage provider must support
///
/// Every method addresses objects through a [`CloudPath`], which carries the
/// bucket and key. Missing objects are reported as
/// [`Error::NotFound`](crate::Error::NotFound).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch object metadata
    async fn head_object(&self, path: &CloudPath) -> Result<ObjectInfo>;

    /// Download the full object body
    async fn get_object(&self, path: &CloudPath) -> Result<Vec<u8>>;

    /// Upload an object, replacing any existing one
    async fn put_object(&self, path: &CloudPath, data: Vec<u8>) -> Result<ObjectInfo>;

    async fn delete_object(&self, path: &CloudPath) -> Result<()>;

    /// Server-side copy within this provider
    async fn copy_object(&self, src: &CloudPath, dst: &CloudPath) -> Result<ObjectInfo>;

    /// Whether at least one object exists under `prefix` in the path's bucket
    async fn prefix_exists(&self, path: &CloudPath, prefix: &str) -> Result<bool>;

    /// Upload a local file. Providers with a native file upload override this.
    async fn upload_file(&self, local: &Path, dst: &CloudPath) -> Result<ObjectInfo> {
        let data = tokio::fs::read(local).await?;
        self.put_object(dst, data).await
    }

    /// Download an object into a local file, replacing it
    async fn download_file(&self, src: &CloudPath, local: &Path) -> Result<()> {
        let data = self.get_object(src).await?;
        tokio::fs::write(local, data).await?;
        Ok(())
    }
}
