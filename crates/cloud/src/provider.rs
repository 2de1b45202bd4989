//! Google Cloud Storage and Azure Blob Storage through `object_store`
//!
//! `object_store` clients are bound to a single bucket (or container), so a
//! [`ProviderStore`] builds one per bucket from the environment on first use
//! and keeps it for the rest of the process.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use jiff::Timestamp;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, PutPayload};

use dt_core::{CloudPath, CloudScheme, Error, ObjectInfo, ObjectStore, Result};

type DynStore = Arc<dyn object_store::ObjectStore>;

/// [`ObjectStore`] for one non-S3 provider
pub struct ProviderStore {
    scheme: CloudScheme,
    buckets: RwLock<HashMap<String, DynStore>>,
}

impl ProviderStore {
    pub fn new(scheme: CloudScheme) -> Self {
        Self {
            scheme,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// Serve `bucket` from an already built store
    pub fn with_bucket(self, bucket: impl Into<String>, store: DynStore) -> Self {
        self.buckets
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(bucket.into(), store);
        self
    }

    pub fn scheme(&self) -> CloudScheme {
        self.scheme
    }

    fn build(&self, bucket: &str) -> Result<DynStore> {
        let store: DynStore = match self.scheme {
            CloudScheme::Gs => Arc::new(
                object_store::gcp::GoogleCloudStorageBuilder::from_env()
                    .with_bucket_name(bucket)
                    .build()
                    .map_err(|e| Error::Config(format!("GCS bucket {bucket}: {e}")))?,
            ),
            CloudScheme::Az => Arc::new(
                object_store::azure::MicrosoftAzureBuilder::from_env()
                    .with_container_name(bucket)
                    .build()
                    .map_err(|e| Error::Config(format!("Azure container {bucket}: {e}")))?,
            ),
            CloudScheme::S3 => {
                return Err(Error::Config(
                    "S3 is served by S3Client, not ProviderStore".to_string(),
                ));
            }
        };
        tracing::debug!(scheme = %self.scheme, bucket, "Built object store client");
        Ok(store)
    }

    fn store(&self, path: &CloudPath) -> Result<DynStore> {
        if let Some(store) = self
            .buckets
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&path.bucket)
        {
            return Ok(store.clone());
        }

        let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());
        if let Some(store) = buckets.get(&path.bucket) {
            return Ok(store.clone());
        }
        let store = self.build(&path.bucket)?;
        buckets.insert(path.bucket.clone(), store.clone());
        Ok(store)
    }
}

fn location(path: &CloudPath) -> ObjectPath {
    ObjectPath::from(path.key.as_str())
}

fn map_error(error: object_store::Error, path: &CloudPath) -> Error {
    match error {
        object_store::Error::NotFound { .. } => Error::NotFound(path.to_string()),
        other => Error::Network(other.to_string()),
    }
}

fn object_info(key: &str, meta: &ObjectMeta) -> ObjectInfo {
    let mut info = ObjectInfo::file(key, meta.size as i64);
    info.last_modified = Timestamp::from_second(meta.last_modified.timestamp()).ok();
    info.etag = meta.e_tag.as_ref().map(|etag| etag.trim_matches('"').to_string());
    info
}

#[async_trait]
impl ObjectStore for ProviderStore {
    async fn head_object(&self, path: &CloudPath) -> Result<ObjectInfo> {
        let meta = self
            .store(path)?
            .head(&location(path))
            .await
            .map_err(|e| map_error(e, path))?;
        Ok(object_info(&path.key, &meta))
    }

    async fn get_object(&self, path: &CloudPath) -> Result<Vec<u8>> {
        let result = self
            .store(path)?
            .get(&location(path))
            .await
            .map_err(|e| map_error(e, path))?;
        let bytes = result.bytes().await.map_err(|e| map_error(e, path))?;
        Ok(bytes.to_vec())
    }

    async fn put_object(&self, path: &CloudPath, data: Vec<u8>) -> Result<ObjectInfo> {
        let size = data.len() as i64;
        let result = self
            .store(path)?
            .put(&location(path), PutPayload::from(data))
            .await
            .map_err(|e| map_error(e, path))?;

        let mut info = ObjectInfo::file(&path.key, size);
        info.etag = result.e_tag;
        info.last_modified = Some(Timestamp::now());
        Ok(info)
    }

    async fn delete_object(&self, path: &CloudPath) -> Result<()> {
        self.store(path)?
            .delete(&location(path))
            .await
            .map_err(|e| map_error(e, path))
    }

    async fn copy_object(&self, src: &CloudPath, dst: &CloudPath) -> Result<ObjectInfo> {
        if src.bucket == dst.bucket {
            self.store(src)?
                .copy(&location(src), &location(dst))
                .await
                .map_err(|e| map_error(e, src))?;
            return self.head_object(dst).await;
        }

        // A client only reaches one bucket.
        let data = self.get_object(src).await?;
        self.put_object(dst, data).await
    }

    async fn prefix_exists(&self, path: &CloudPath, prefix: &str) -> Result<bool> {
        let prefix = prefix.trim_end_matches('/');
        let prefix = (!prefix.is_empty()).then(|| ObjectPath::from(prefix));
        let listing = self
            .store(path)?
            .list_with_delimiter(prefix.as_ref())
            .await
            .map_err(|e| map_error(e, path))?;
        Ok(!listing.objects.is_empty() || !listing.common_prefixes.is_empty())
    }
}
