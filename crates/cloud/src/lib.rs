//! dt-cloud: Object storage adapters for datatool
//!
//! This crate implements the `ObjectStore` trait from dt-core:
//! - [`S3Client`] for Amazon S3 and S3-compatible services via aws-sdk-s3
//! - [`ProviderStore`] for Google Cloud Storage and Azure Blob Storage via
//!   `object_store`

mod provider;
mod s3;

use std::sync::Arc;

use dt_core::{CloudScheme, Result, StoreRegistry};

pub use provider::ProviderStore;
pub use s3::{S3Client, S3Options, StaticCredentials};

/// Register a store for every supported scheme in `registry`
pub async fn register_stores(registry: &StoreRegistry, s3: S3Options) -> Result<()> {
    registry.register(CloudScheme::S3, Arc::new(S3Client::new(s3).await?));
    registry.register(CloudScheme::Gs, Arc::new(ProviderStore::new(CloudScheme::Gs)));
    registry.register(CloudScheme::Az, Arc::new(ProviderStore::new(CloudScheme::Az)));
    Ok(())
}
