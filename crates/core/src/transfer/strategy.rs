//! Transfer strategies, one per ordered backend pair

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::path::{BackendFamily, PathHandle, StoragePath};

/// Moves the content of one path to another
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransferStrategy: Send + Sync {
    async fn transfer(&self, source: &PathHandle, target: &PathHandle) -> Result<()>;
}

fn unsupported(source: &PathHandle, target: &PathHandle) -> Error {
    Error::UnsupportedCombination {
        from: source.family(),
        to: target.family(),
    }
}

/// Buffer the whole source and write it to the target
async fn read_then_write(source: &PathHandle, target: &PathHandle) -> Result<()> {
    let data = source.read_bytes().await?;
    tracing::debug!(%source, %target, bytes = data.len(), "Copying buffered content");
    target.write_bytes(&data).await
}

pub struct LocalToLocal;

#[async_trait]
impl TransferStrategy for LocalToLocal {
    async fn transfer(&self, source: &PathHandle, target: &PathHandle) -> Result<()> {
        let (PathHandle::Local(src), PathHandle::Local(dst)) = (source, target) else {
            return Err(unsupported(source, target));
        };
        let bytes = tokio::fs::copy(src.as_path(), dst.as_path()).await?;
        tracing::debug!(%src, %dst, bytes, "Copied local file");
        Ok(())
    }
}

pub struct LocalToCloud;

#[async_trait]
impl TransferStrategy for LocalToCloud {
    async fn transfer(&self, source: &PathHandle, target: &PathHandle) -> Result<()> {
        let (PathHandle::Local(src), PathHandle::Cloud(dst)) = (source, target) else {
            return Err(unsupported(source, target));
        };
        tracing::debug!(%src, %dst, "Uploading");
        dst.upload_from(src).await
    }
}

pub struct CloudToLocal;

#[async_trait]
impl TransferStrategy for CloudToLocal {
    async fn transfer(&self, source: &PathHandle, target: &PathHandle) -> Result<()> {
        let (PathHandle::Cloud(src), PathHandle::Local(dst)) = (source, target) else {
            return Err(unsupported(source, target));
        };
        tracing::debug!(%src, %dst, "Downloading");
        src.download_to(dst).await
    }
}

pub struct CloudToCloud;

#[async_trait]
impl TransferStrategy for CloudToCloud {
    async fn transfer(&self, source: &PathHandle, target: &PathHandle) -> Result<()> {
        let (PathHandle::Cloud(src), PathHandle::Cloud(dst)) = (source, target) else {
            return Err(unsupported(source, target));
        };
        tracing::debug!(%src, %dst, "Copying between buckets");
        src.copy_to(dst).await
    }
}

/// Generates the read-then-write strategies for pairs with no native primitive
macro_rules! buffered_strategy {
    ($(#[$meta:meta])* $name:ident, $from:ident => $to:ident) => {
        $(#[$meta])*
        pub struct $name;

        #[async_trait]
        impl TransferStrategy for $name {
            async fn transfer(&self, source: &PathHandle, target: &PathHandle) -> Result<()> {
                match (source, target) {
                    (PathHandle::$from(_), PathHandle::$to(_)) => {
                        read_then_write(source, target).await
                    }
                    _ => Err(unsupported(source, target)),
                }
            }
        }
    };
}

buffered_strategy!(LocalToRemote, Local => Remote);
buffered_strategy!(RemoteToLocal, Remote => Local);
buffered_strategy!(RemoteToCloud, Remote => Cloud);
buffered_strategy!(CloudToRemote, Cloud => Remote);
buffered_strategy!(RemoteToRemote, Remote => Remote);

/// Dispatch table keyed by `(source family, target family)`
#[derive(Clone)]
pub struct StrategyTable {
    entries: HashMap<(BackendFamily, BackendFamily), Arc<dyn TransferStrategy>>,
}

impl StrategyTable {
    /// A table with no entries
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn insert(
        &mut self,
        from: BackendFamily,
        to: BackendFamily,
        strategy: Arc<dyn TransferStrategy>,
    ) -> Option<Arc<dyn TransferStrategy>> {
        self.entries.insert((from, to), strategy)
    }

    pub fn get(&self, from: BackendFamily, to: BackendFamily) -> Option<Arc<dyn TransferStrategy>> {
        self.entries.get(&(from, to)).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for StrategyTable {
    fn default() -> Self {
        use BackendFamily::*;

        let mut table = Self::empty();
        table.insert(Local, Local, Arc::new(LocalToLocal));
        table.insert(Local, Cloud, Arc::new(LocalToCloud));
        table.insert(Cloud, Local, Arc::new(CloudToLocal));
        table.insert(Cloud, Cloud, Arc::new(CloudToCloud));
        table.insert(Local, Remote, Arc::new(LocalToRemote));
        table.insert(Remote, Local, Arc::new(RemoteToLocal));
        table.insert(Remote, Cloud, Arc::new(RemoteToCloud));
        table.insert(Cloud, Remote, Arc::new(CloudToRemote));
        table.insert(Remote, Remote, Arc::new(RemoteToRemote));
        table
    }
}

impl fmt::Debug for StrategyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pairs: Vec<String> = self
            .entries
            .keys()
            .map(|(from, to)| format!("{from}->{to}"))
            .collect();
        pairs.sort();
        f.debug_struct("StrategyTable").field("pairs", &pairs).finish()
    }
}
