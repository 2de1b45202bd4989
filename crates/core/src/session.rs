//! SSH session cache
//!
//! Remote paths never open connections themselves. They ask the
//! [`SessionCache`] for a [`Session`] keyed by the full connection tuple
//! (host, port, user, password, key file), and open their own
//! [`FileTransfer`] sub-session on top of it.
//!
//! The transport is pluggable through [`Connector`]; `dt-ssh` provides the
//! russh implementation. Every session created by the cache is tracked in a
//! [`SessionRegistry`] that holds only weak references, so shutdown can
//! close whatever is still alive without keeping anything alive itself.

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, Weak};

use async_trait::async_trait;
use moka::future::Cache;
use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;

use crate::error::{Error, Result};

/// Default number of sessions kept by a [`SessionCache`]
pub const DEFAULT_SESSION_CAPACITY: u64 = 32;

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;

/// Credentials passed through to SSH authentication
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct SshAuth {
    pub password: Option<String>,
    pub key_path: Option<String>,
}

impl SshAuth {
    pub fn password(password: impl Into<String>) -> Self {
        Self {
            password: Some(password.into()),
            key_path: None,
        }
    }

    pub fn key_path(key_path: impl Into<String>) -> Self {
        Self {
            password: None,
            key_path: Some(key_path.into()),
        }
    }
}

impl fmt::Debug for SshAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshAuth")
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("key_path", &self.key_path)
            .finish()
    }
}

/// Identity of a cached session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub auth: SshAuth,
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.username {
            Some(user) => write!(f, "{user}@{}:{}", self.host, self.port),
            None => write!(f, "{}:{}", self.host, self.port),
        }
    }
}

/// Result of a remote stat
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoteStat {
    pub size: Option<u64>,
    /// POSIX mode bits, when the server reports them
    pub permissions: Option<u32>,
}

impl RemoteStat {
    /// Whether the mode bits describe a directory; `false` without mode bits
    pub fn is_dir(&self) -> bool {
        self.permissions
            .map(|mode| mode & S_IFMT == S_IFDIR)
            .unwrap_or(false)
    }
}

/// Opens authenticated SSH sessions
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect and authenticate. Failures are [`Error::Connection`].
    async fn connect(&self, key: &SessionKey) -> Result<Arc<dyn Session>>;
}

/// One authenticated SSH connection
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Session: Send + Sync {
    /// Whether the underlying transport is still usable
    fn is_active(&self) -> bool;

    /// Open a file-transfer sub-session over this connection
    async fn open_file_transfer(&self) -> Result<Arc<dyn FileTransfer>>;

    async fn close(&self);
}

/// A file-transfer channel (SFTP) opened over a [`Session`]
///
/// Paths are absolute POSIX strings. A missing target is reported as
/// [`Error::NotFound`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileTransfer: Send + Sync {
    /// Whether the channel has been closed and must be reopened
    fn is_closed(&self) -> bool;

    async fn stat(&self, path: &str) -> Result<RemoteStat>;

    async fn mkdir(&self, path: &str) -> Result<()>;

    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Create or truncate `path` and write `data`
    async fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    async fn remove(&self, path: &str) -> Result<()>;
}

/// Weakly-held set of every session created by a cache
#[derive(Default)]
pub struct SessionRegistry {
    live: Mutex<Vec<Weak<dyn Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a session without extending its lifetime
    pub fn register(&self, session: &Arc<dyn Session>) {
        let mut live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        live.retain(|weak| weak.strong_count() > 0);
        live.push(Arc::downgrade(session));
    }

    /// Number of registered sessions that are still referenced somewhere
    pub fn live_count(&self) -> usize {
        let live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        live.iter().filter(|weak| weak.strong_count() > 0).count()
    }

    /// Close every registered session that is still alive and active
    pub async fn close_all(&self) {
        let sessions: Vec<Arc<dyn Session>> = {
            let mut live = self.live.lock().unwrap_or_else(|e| e.into_inner());
            live.drain(..).filter_map(|weak| weak.upgrade()).collect()
        };

        for session in sessions {
            if session.is_active() {
                session.close().await;
            }
        }
    }
}

static GLOBAL_SESSIONS: OnceLock<Arc<SessionCache>> = OnceLock::new();

/// Bounded, process-wide cache of SSH sessions
pub struct SessionCache {
    connector: Arc<dyn Connector>,
    sessions: Cache<SessionKey, Arc<dyn Session>>,
    registry: Arc<SessionRegistry>,
}

impl SessionCache {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self::with_capacity(connector, DEFAULT_SESSION_CAPACITY)
    }

    pub fn with_capacity(connector: Arc<dyn Connector>, capacity: u64) -> Self {
        let sessions: Cache<SessionKey, Arc<dyn Session>> = Cache::builder()
            .max_capacity(capacity)
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(|key: Arc<SessionKey>, session: Arc<dyn Session>, cause| {
                tracing::debug!(session = %key, ?cause, "SSH session left the cache");
                if cause == RemovalCause::Size {
                    close_evicted(key, session);
                }
            })
            .build();

        Self {
            connector,
            sessions,
            registry: Arc::new(SessionRegistry::new()),
        }
    }

    /// Install the process-wide cache. The first installed cache wins and
    /// is returned.
    pub fn install(cache: Arc<SessionCache>) -> Arc<SessionCache> {
        GLOBAL_SESSIONS.get_or_init(|| cache).clone()
    }

    /// The process-wide cache, if one was installed
    pub fn global() -> Result<Arc<SessionCache>> {
        GLOBAL_SESSIONS
            .get()
            .cloned()
            .ok_or_else(|| Error::Config("No SSH connector installed".to_string()))
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Get a live session for `key`, connecting when none is cached or the
    /// cached one is no longer active.
    pub async fn get(&self, key: &SessionKey) -> Result<Arc<dyn Session>> {
        if let Some(session) = self.sessions.get(key).await {
            if session.is_active() {
                return Ok(session);
            }
            tracing::debug!(session = %key, "Cached SSH session is inactive, reconnecting");
            self.sessions.invalidate(key).await;
        }

        let connector = self.connector.clone();
        let registry = self.registry.clone();
        let owned_key = key.clone();

        // Concurrent misses on the same key share one connection attempt.
        self.sessions
            .try_get_with(key.clone(), async move {
                let session = connector.connect(&owned_key).await?;
                registry.register(&session);
                tracing::info!(session = %owned_key, "SSH session established");
                Ok::<_, Error>(session)
            })
            .await
            .map_err(|e| {
                Arc::try_unwrap(e).unwrap_or_else(|shared| Error::Connection(shared.to_string()))
            })
    }

    /// Drop every cached session and close the ones still alive
    pub async fn close_all(&self) {
        self.sessions.invalidate_all();
        self.registry.close_all().await;
    }
}

/// Close a session pushed out by the capacity bound
fn close_evicted(key: Arc<SessionKey>, session: Arc<dyn Session>) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if session.is_active() {
                    session.close().await;
                    tracing::debug!(session = %key, "Closed evicted SSH session");
                }
            });
        }
        Err(_) => {
            tracing::warn!(session = %key, "No runtime to close evicted SSH session");
        }
    }
}

impl fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCache")
            .field("entries", &self.sessions.entry_count())
            .finish()
    }
}
