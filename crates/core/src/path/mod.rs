//! Path handles
//!
//! Every storage location is a [`PathHandle`]: a closed enum over the local
//! filesystem, cloud object storage and SSH hosts. All three variants share
//! the [`StoragePath`] contract, so callers never need to know which backend
//! they are talking to.

mod cloud;
mod local;
mod remote;
mod resolve;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use cloud::{CloudPath, CloudScheme, StoreRegistry};
pub use local::LocalPath;
pub use remote::{RemotePath, SSH_SCHEME};
pub use resolve::{Backends, PathResolver, resolve};

/// Storage backend behind a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendFamily {
    Local,
    Cloud,
    Remote,
}

impl BackendFamily {
    pub const ALL: [BackendFamily; 3] = [
        BackendFamily::Local,
        BackendFamily::Cloud,
        BackendFamily::Remote,
    ];
}

impl fmt::Display for BackendFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendFamily::Local => write!(f, "local"),
            BackendFamily::Cloud => write!(f, "cloud"),
            BackendFamily::Remote => write!(f, "remote"),
        }
    }
}

/// How invalid UTF-8 is handled when reading text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecodeErrors {
    /// Fail with [`Error::Encoding`]
    #[default]
    Strict,
    /// Substitute U+FFFD
    Replace,
}

/// Decode UTF-8 according to `errors`
pub fn decode_utf8(bytes: Vec<u8>, errors: DecodeErrors) -> Result<String> {
    match errors {
        DecodeErrors::Strict => {
            String::from_utf8(bytes).map_err(|e| Error::Encoding(e.to_string()))
        }
        DecodeErrors::Replace => Ok(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

/// Filesystem contract shared by every backend
///
/// Pure operations (`name`, `parent`, `join`) never perform I/O. Everything
/// else is async and may connect to the backend on first use.
#[async_trait]
pub trait StoragePath: fmt::Display + Send + Sync + Sized {
    fn family(&self) -> BackendFamily;

    fn is_absolute(&self) -> bool;

    /// Final path component, empty for a root
    fn name(&self) -> String;

    /// Parent location on the same backend; a root is its own parent
    fn parent(&self) -> Self;

    /// Append a relative segment
    fn join(&self, segment: &str) -> Self;

    async fn exists(&self) -> Result<bool>;

    /// `false` for missing paths
    async fn is_dir(&self) -> Result<bool>;

    /// Create this directory, and its missing ancestors when `recursive`.
    /// Recursive creation of an existing tree succeeds.
    async fn make_dirs(&self, recursive: bool) -> Result<()>;

    async fn read_bytes(&self) -> Result<Vec<u8>>;

    /// Create or replace the file with `data`
    async fn write_bytes(&self, data: &[u8]) -> Result<()>;

    /// Remove the file. A missing file is an error unless `missing_ok`.
    async fn delete(&self, missing_ok: bool) -> Result<()>;

    async fn read_text(&self, errors: DecodeErrors) -> Result<String> {
        decode_utf8(self.read_bytes().await?, errors)
    }

    /// Write `text` as UTF-8. Encoding a `&str` cannot fail, so unlike
    /// [`StoragePath::read_text`] there is no error policy to choose.
    async fn write_text(&self, text: &str) -> Result<()> {
        self.write_bytes(text.as_bytes()).await
    }
}

/// A location on any supported backend
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathHandle {
    Local(LocalPath),
    Cloud(CloudPath),
    Remote(RemotePath),
}

impl PathHandle {
    pub fn as_local(&self) -> Option<&LocalPath> {
        match self {
            PathHandle::Local(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_cloud(&self) -> Option<&CloudPath> {
        match self {
            PathHandle::Cloud(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_remote(&self) -> Option<&RemotePath> {
        match self {
            PathHandle::Remote(p) => Some(p),
            _ => None,
        }
    }
}

macro_rules! delegate {
    ($self:expr, $p:ident => $body:expr) => {
        match $self {
            PathHandle::Local($p) => $body,
            PathHandle::Cloud($p) => $body,
            PathHandle::Remote($p) => $body,
        }
    };
}

macro_rules! delegate_wrap {
    ($self:expr, $p:ident => $body:expr) => {
        match $self {
            PathHandle::Local($p) => PathHandle::Local($body),
            PathHandle::Cloud($p) => PathHandle::Cloud($body),
            PathHandle::Remote($p) => PathHandle::Remote($body),
        }
    };
}

#[async_trait]
impl StoragePath for PathHandle {
    fn family(&self) -> BackendFamily {
        delegate!(self, p => p.family())
    }

    fn is_absolute(&self) -> bool {
        delegate!(self, p => p.is_absolute())
    }

    fn name(&self) -> String {
        delegate!(self, p => p.name())
    }

    fn parent(&self) -> Self {
        delegate_wrap!(self, p => p.parent())
    }

    fn join(&self, segment: &str) -> Self {
        delegate_wrap!(self, p => p.join(segment))
    }

    async fn exists(&self) -> Result<bool> {
        delegate!(self, p => p.exists().await)
    }

    async fn is_dir(&self) -> Result<bool> {
        delegate!(self, p => p.is_dir().await)
    }

    async fn make_dirs(&self, recursive: bool) -> Result<()> {
        delegate!(self, p => p.make_dirs(recursive).await)
    }

    async fn read_bytes(&self) -> Result<Vec<u8>> {
        delegate!(self, p => p.read_bytes().await)
    }

    async fn write_bytes(&self, data: &[u8]) -> Result<()> {
        delegate!(self, p => p.write_bytes(data).await)
    }

    async fn delete(&self, missing_ok: bool) -> Result<()> {
        delegate!(self, p => p.delete(missing_ok).await)
    }
}

impl fmt::Display for PathHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        delegate!(self, p => fmt::Display::fmt(p, f))
    }
}

impl From<LocalPath> for PathHandle {
    fn from(path: LocalPath) -> Self {
        PathHandle::Local(path)
    }
}

impl From<CloudPath> for PathHandle {
    fn from(path: CloudPath) -> Self {
        PathHandle::Cloud(path)
    }
}

impl From<RemotePath> for PathHandle {
    fn from(path: RemotePath) -> Self {
        PathHandle::Remote(path)
    }
}
