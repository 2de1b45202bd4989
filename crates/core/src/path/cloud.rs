//! Cloud object storage paths
//!
//! A [`CloudPath`] addresses `scheme://bucket/key`. The object store that
//! serves a path is looked up by scheme in a [`StoreRegistry`] when the first
//! I/O operation runs, so parsing a path never touches the network.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{BackendFamily, LocalPath, StoragePath};
use crate::error::{Error, Result};
use crate::traits::ObjectStore;

/// Supported object storage URI schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudScheme {
    /// Amazon S3 and S3-compatible services (`s3://`)
    S3,
    /// Google Cloud Storage (`gs://`)
    Gs,
    /// Azure Blob Storage (`az://`)
    Az,
}

impl CloudScheme {
    pub const ALL: [CloudScheme; 3] = [CloudScheme::S3, CloudScheme::Gs, CloudScheme::Az];

    pub fn as_str(&self) -> &'static str {
        match self {
            CloudScheme::S3 => "s3",
            CloudScheme::Gs => "gs",
            CloudScheme::Az => "az",
        }
    }

    /// Match the scheme prefix of a URI, returning the scheme and the rest
    pub fn strip_prefix(uri: &str) -> Option<(CloudScheme, &str)> {
        Self::ALL.into_iter().find_map(|scheme| {
            uri.strip_prefix(scheme.as_str())
                .and_then(|rest| rest.strip_prefix("://"))
                .map(|rest| (scheme, rest))
        })
    }
}

impl fmt::Display for CloudScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static GLOBAL_STORES: LazyLock<Arc<StoreRegistry>> =
    LazyLock::new(|| Arc::new(StoreRegistry::new()));

/// Maps URI schemes to the object store serving them
#[derive(Default)]
pub struct StoreRegistry {
    stores: RwLock<HashMap<CloudScheme, Arc<dyn ObjectStore>>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry used by paths built without an explicit one
    pub fn global() -> Arc<StoreRegistry> {
        GLOBAL_STORES.clone()
    }

    /// Register (or replace) the store for a scheme
    pub fn register(&self, scheme: CloudScheme, store: Arc<dyn ObjectStore>) {
        let mut stores = self.stores.write().unwrap_or_else(|e| e.into_inner());
        stores.insert(scheme, store);
    }

    pub fn get(&self, scheme: CloudScheme) -> Result<Arc<dyn ObjectStore>> {
        let stores = self.stores.read().unwrap_or_else(|e| e.into_inner());
        stores.get(&scheme).cloned().ok_or_else(|| {
            Error::Config(format!("No object store registered for {scheme}://"))
        })
    }
}

impl fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stores = self.stores.read().unwrap_or_else(|e| e.into_inner());
        let schemes: Vec<_> = stores.keys().collect();
        f.debug_struct("StoreRegistry")
            .field("schemes", &schemes)
            .finish()
    }
}

/// A path in cloud object storage
#[derive(Clone)]
pub struct CloudPath {
    pub scheme: CloudScheme,
    pub bucket: String,
    /// Object key, without a leading slash. Empty for the bucket root.
    pub key: String,
    registry: Option<Arc<StoreRegistry>>,
}

impl CloudPath {
    pub fn new(scheme: CloudScheme, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        let key: String = key.into();
        Self {
            scheme,
            bucket: bucket.into(),
            key: key.trim_start_matches('/').to_string(),
            registry: None,
        }
    }

    /// Parse `s3://bucket/key`, `gs://bucket/key` or `az://container/key`
    pub fn parse(uri: &str) -> Result<Self> {
        let (scheme, rest) = CloudScheme::strip_prefix(uri)
            .ok_or_else(|| Error::InvalidPath(format!("Not a cloud URI: {uri}")))?;
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(Error::InvalidPath(format!("Bucket is required: {uri}")));
        }
        Ok(Self::new(scheme, bucket, key))
    }

    /// Resolve stores through `registry` instead of the global one
    pub fn with_registry(mut self, registry: Arc<StoreRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// The object store serving this path
    pub fn store(&self) -> Result<Arc<dyn ObjectStore>> {
        match &self.registry {
            Some(registry) => registry.get(self.scheme),
            None => StoreRegistry::global().get(self.scheme),
        }
    }

    /// Key prefix used to find objects "inside" this path
    fn dir_prefix(&self) -> String {
        if self.key.is_empty() {
            String::new()
        } else {
            format!("{}/", self.key.trim_end_matches('/'))
        }
    }

    fn with_key(&self, key: String) -> Self {
        Self {
            scheme: self.scheme,
            bucket: self.bucket.clone(),
            key,
            registry: self.registry.clone(),
        }
    }

    /// Upload a local file to this path
    pub async fn upload_from(&self, local: &LocalPath) -> Result<()> {
        self.store()?.upload_file(local.as_path(), self).await?;
        Ok(())
    }

    /// Download this object into a local file
    pub async fn download_to(&self, local: &LocalPath) -> Result<()> {
        self.store()?.download_file(self, local.as_path()).await
    }

    /// Copy this object to another cloud path.
    ///
    /// Uses a server-side copy when both paths share a provider; otherwise
    /// the object is downloaded and re-uploaded.
    pub async fn copy_to(&self, target: &CloudPath) -> Result<()> {
        let source_store = self.store()?;
        if self.scheme == target.scheme {
            source_store.copy_object(self, target).await?;
        } else {
            let data = source_store.get_object(self).await?;
            target.store()?.put_object(target, data).await?;
        }
        Ok(())
    }
}

impl PartialEq for CloudPath {
    fn eq(&self, other: &Self) -> bool {
        self.scheme == other.scheme && self.bucket == other.bucket && self.key == other.key
    }
}

impl Eq for CloudPath {}

impl Hash for CloudPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.scheme.hash(state);
        self.bucket.hash(state);
        self.key.hash(state);
    }
}

impl fmt::Display for CloudPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.key.is_empty() {
            write!(f, "{}://{}", self.scheme, self.bucket)
        } else {
            write!(f, "{}://{}/{}", self.scheme, self.bucket, self.key)
        }
    }
}

impl fmt::Debug for CloudPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CloudPath('{self}')")
    }
}

#[async_trait]
impl StoragePath for CloudPath {
    fn family(&self) -> BackendFamily {
        BackendFamily::Cloud
    }

    fn is_absolute(&self) -> bool {
        true
    }

    fn name(&self) -> String {
        let key = self.key.trim_end_matches('/');
        key.rsplit('/').next().unwrap_or_default().to_string()
    }

    fn parent(&self) -> Self {
        let key = self.key.trim_end_matches('/');
        let parent = key.rsplit_once('/').map(|(p, _)| p).unwrap_or_default();
        self.with_key(parent.to_string())
    }

    fn join(&self, segment: &str) -> Self {
        let segment = segment.trim_start_matches('/');
        if self.key.is_empty() {
            self.with_key(segment.to_string())
        } else {
            self.with_key(format!("{}/{segment}", self.key.trim_end_matches('/')))
        }
    }

    async fn exists(&self) -> Result<bool> {
        let store = self.store()?;
        if !self.key.is_empty() {
            match store.head_object(self).await {
                Ok(_) => return Ok(true),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        store.prefix_exists(self, &self.dir_prefix()).await
    }

    async fn is_dir(&self) -> Result<bool> {
        self.store()?.prefix_exists(self, &self.dir_prefix()).await
    }

    async fn make_dirs(&self, _recursive: bool) -> Result<()> {
        // Object storage has no directories to create.
        Ok(())
    }

    async fn read_bytes(&self) -> Result<Vec<u8>> {
        self.store()?.get_object(self).await
    }

    async fn write_bytes(&self, data: &[u8]) -> Result<()> {
        self.store()?.put_object(self, data.to_vec()).await?;
        Ok(())
    }

    async fn delete(&self, missing_ok: bool) -> Result<()> {
        let store = self.store()?;
        // Most providers report success when deleting a missing key.
        if !missing_ok {
            store.head_object(self).await?;
        }
        match store.delete_object(self).await {
            Ok(()) => Ok(()),
            Err(e) if missing_ok && e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}
