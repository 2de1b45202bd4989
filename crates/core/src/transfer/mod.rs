//! Transfer engine
//!
//! [`TransferEngine::transfer_file`] moves a file between any two backends.
//! The engine classifies both paths, picks the strategy registered for the
//! `(source, target)` family pair and runs it once. It makes sure local
//! target directories exist and can delete the source afterwards.

mod strategy;

pub use strategy::{
    CloudToCloud, CloudToLocal, CloudToRemote, LocalToCloud, LocalToLocal, LocalToRemote,
    RemoteToCloud, RemoteToLocal, RemoteToRemote, StrategyTable, TransferStrategy,
};

use crate::error::{Error, Result};
use crate::file::FileRef;
use crate::path::{PathHandle, StoragePath};

/// Dispatches file transfers to backend-pair strategies
#[derive(Debug, Clone, Default)]
pub struct TransferEngine {
    table: StrategyTable,
}

impl TransferEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom dispatch table
    pub fn with_table(table: StrategyTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &StrategyTable {
        &self.table
    }

    /// Copy `source` to `target`, deleting the source afterwards when
    /// `delete_source` is set.
    ///
    /// The source is only deleted once the copy succeeded; its cached
    /// content is then cleared. Errors are logged and returned unchanged.
    pub async fn transfer_file(
        &self,
        source: &mut dyn FileRef,
        target: &dyn FileRef,
        delete_source: bool,
    ) -> Result<()> {
        tracing::info!(
            name = %source.name(),
            source = %source.path(),
            target = %target.path(),
            "Transferring file"
        );

        if let Err(e) = self.run(source, target, delete_source).await {
            tracing::error!(
                source = %source.path(),
                target = %target.path(),
                error = %e,
                "File transfer failed"
            );
            return Err(e);
        }

        tracing::info!(
            source = %source.path(),
            target = %target.path(),
            moved = delete_source,
            "File transfer complete"
        );
        Ok(())
    }

    async fn run(
        &self,
        source: &mut dyn FileRef,
        target: &dyn FileRef,
        delete_source: bool,
    ) -> Result<()> {
        if let PathHandle::Local(local) = target.path() {
            local.parent().make_dirs(true).await?;
        }

        let (from, to) = (source.path().family(), target.path().family());
        let strategy = self
            .table
            .get(from, to)
            .ok_or(Error::UnsupportedCombination { from, to })?;
        tracing::debug!(%from, %to, "Selected transfer strategy");

        strategy.transfer(source.path(), target.path()).await?;

        if delete_source {
            source.path().delete(false).await?;
            source.clear_content();
        }
        Ok(())
    }
}

/// Transfer with the default strategy table
pub async fn transfer_file(
    source: &mut dyn FileRef,
    target: &dyn FileRef,
    delete_source: bool,
) -> Result<()> {
    TransferEngine::new()
        .transfer_file(source, target, delete_source)
        .await
}
