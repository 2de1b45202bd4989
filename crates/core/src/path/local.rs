//! Local filesystem paths

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{BackendFamily, StoragePath};
use crate::error::Result;

/// A path on the local filesystem
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalPath {
    inner: PathBuf,
}

impl LocalPath {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let inner: PathBuf = path.into();
        if inner.as_os_str().is_empty() {
            return Self {
                inner: PathBuf::from("."),
            };
        }
        Self { inner }
    }

    pub fn as_path(&self) -> &Path {
        &self.inner
    }
}

impl From<PathBuf> for LocalPath {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}

impl From<&Path> for LocalPath {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}

impl fmt::Display for LocalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.display())
    }
}

#[async_trait]
impl StoragePath for LocalPath {
    fn family(&self) -> BackendFamily {
        BackendFamily::Local
    }

    fn is_absolute(&self) -> bool {
        self.inner.is_absolute()
    }

    fn name(&self) -> String {
        self.inner
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn parent(&self) -> Self {
        match self.inner.parent() {
            Some(p) if !p.as_os_str().is_empty() => Self::new(p),
            Some(_) => Self::new("."),
            None => self.clone(),
        }
    }

    fn join(&self, segment: &str) -> Self {
        Self::new(self.inner.join(segment))
    }

    async fn exists(&self) -> Result<bool> {
        Ok(tokio::fs::try_exists(&self.inner).await?)
    }

    async fn is_dir(&self) -> Result<bool> {
        match tokio::fs::metadata(&self.inner).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn make_dirs(&self, recursive: bool) -> Result<()> {
        if recursive {
            tokio::fs::create_dir_all(&self.inner).await?;
        } else {
            tokio::fs::create_dir(&self.inner).await?;
        }
        Ok(())
    }

    async fn read_bytes(&self) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(&self.inner).await?)
    }

    async fn write_bytes(&self, data: &[u8]) -> Result<()> {
        tokio::fs::write(&self.inner, data).await?;
        Ok(())
    }

    async fn delete(&self, missing_ok: bool) -> Result<()> {
        match tokio::fs::remove_file(&self.inner).await {
            Ok(()) => Ok(()),
            Err(e) if missing_ok && e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
