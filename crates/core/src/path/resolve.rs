//! String to path handle classification

use std::sync::Arc;

use super::{CloudPath, CloudScheme, LocalPath, PathHandle, RemotePath, SSH_SCHEME, StoreRegistry};
use crate::error::Result;
use crate::session::{SessionCache, SshAuth};

/// Backends attached to handles built by a [`PathResolver`]
///
/// Unset backends fall back to the process-wide ones when the handle first
/// performs I/O.
#[derive(Debug, Clone, Default)]
pub struct Backends {
    pub sessions: Option<Arc<SessionCache>>,
    pub stores: Option<Arc<StoreRegistry>>,
}

/// Builds path handles from user-supplied strings
#[derive(Debug, Clone, Default)]
pub struct PathResolver {
    backends: Backends,
    ssh_auth: SshAuth,
}

impl PathResolver {
    pub fn new(backends: Backends) -> Self {
        Self {
            backends,
            ssh_auth: SshAuth::default(),
        }
    }

    /// Credentials attached to every remote handle
    pub fn with_ssh_auth(mut self, auth: SshAuth) -> Self {
        self.ssh_auth = auth;
        self
    }

    /// Classify `text` and build the matching handle. Does no I/O.
    ///
    /// `s3://`, `gs://` and `az://` are cloud paths, `ssh://` is remote and
    /// anything else is local; the empty string is the current directory.
    pub fn resolve(&self, text: &str) -> Result<PathHandle> {
        if CloudScheme::strip_prefix(text).is_some() {
            let mut path = CloudPath::parse(text)?;
            if let Some(stores) = &self.backends.stores {
                path = path.with_registry(stores.clone());
            }
            return Ok(PathHandle::Cloud(path));
        }

        if text
            .strip_prefix(SSH_SCHEME)
            .is_some_and(|rest| rest.starts_with("://"))
        {
            let mut path = RemotePath::parse(text)?.with_auth(self.ssh_auth.clone());
            if let Some(sessions) = &self.backends.sessions {
                path = path.with_cache(sessions.clone());
            }
            return Ok(PathHandle::Remote(path));
        }

        Ok(PathHandle::Local(LocalPath::new(text)))
    }
}

/// Resolve `text` against the process-wide backends
pub fn resolve(text: &str) -> Result<PathHandle> {
    PathResolver::default().resolve(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::{BackendFamily, StoragePath};
    use std::path::Path;

    #[test]
    fn test_classification() {
        let cases = [
            ("s3://bucket/key", BackendFamily::Cloud),
            ("gs://bucket/key", BackendFamily::Cloud),
            ("az://container/blob", BackendFamily::Cloud),
            ("ssh://host/file", BackendFamily::Remote),
            ("/tmp/file", BackendFamily::Local),
            ("relative/file", BackendFamily::Local),
            ("s3:/not-cloud", BackendFamily::Local),
            ("sshfile", BackendFamily::Local),
        ];
        for (text, family) in cases {
            assert_eq!(resolve(text).unwrap().family(), family, "{text}");
        }
    }

    #[test]
    fn test_empty_is_current_dir() {
        let handle = resolve("").unwrap();
        assert_eq!(handle.as_local().unwrap().as_path(), Path::new("."));
    }

    #[test]
    fn test_remote_without_host_fails() {
        assert!(resolve("ssh:///path").is_err());
    }

    #[test]
    fn test_cloud_without_bucket_fails() {
        assert!(resolve("s3://").is_err());
    }

    #[test]
    fn test_resolver_attaches_ssh_auth() {
        let resolver = PathResolver::default().with_ssh_auth(SshAuth::key_path("/k"));
        let handle = resolver.resolve("ssh://user@host/data").unwrap();
        let remote = handle.as_remote().unwrap();
        assert_eq!(remote.auth().key_path.as_deref(), Some("/k"));
        assert_eq!(remote.username(), Some("user"));
    }
}
