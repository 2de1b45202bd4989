//! SSH/SFTP paths
//!
//! A [`RemotePath`] is `ssh://[user@]host[:port]/path`. Connection state is
//! lazy: the first filesystem operation acquires a session from the
//! [`SessionCache`] and opens an SFTP sub-session owned by this path.
//! Both are re-acquired transparently when they die.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use url::{Host, Url};

use super::{BackendFamily, StoragePath};
use crate::error::{Error, Result};
use crate::session::{
    DEFAULT_SSH_PORT, FileTransfer, Session, SessionCache, SessionKey, SshAuth,
};

/// URI scheme for remote paths
pub const SSH_SCHEME: &str = "ssh";

#[derive(Default)]
struct Connection {
    session: Option<Arc<dyn Session>>,
    sftp: Option<Arc<dyn FileTransfer>>,
}

/// A file or directory on a host reachable over SSH
pub struct RemotePath {
    host: String,
    port: u16,
    username: Option<String>,
    path: String,
    auth: SshAuth,
    cache: Option<Arc<SessionCache>>,
    connection: Mutex<Connection>,
}

impl RemotePath {
    /// Parse an `ssh://` URL
    pub fn parse(url: &str) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|e| Error::InvalidPath(format!("{url}: {e}")))?;
        if parsed.scheme() != SSH_SCHEME {
            return Err(Error::InvalidPath(format!(
                "Invalid SSH URL scheme: {}",
                parsed.scheme()
            )));
        }

        // IPv6 literals are kept without brackets so they can be dialed.
        let host = match parsed.host() {
            Some(Host::Ipv6(addr)) => addr.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
            _ => {
                return Err(Error::InvalidPath(format!(
                    "Hostname is required for SSH path: {url}"
                )));
            }
        };

        let username = match parsed.username() {
            "" => None,
            user => Some(decode(user)?),
        };

        Ok(Self {
            host,
            port: parsed.port().unwrap_or(DEFAULT_SSH_PORT),
            username,
            path: normalize(&decode(parsed.path())?),
            auth: SshAuth::default(),
            cache: None,
            connection: Mutex::new(Connection::default()),
        })
    }

    /// Attach credentials used when connecting
    pub fn with_auth(mut self, auth: SshAuth) -> Self {
        self.auth = auth;
        self
    }

    /// Use `cache` instead of the process-wide session cache
    pub fn with_cache(mut self, cache: Arc<SessionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// POSIX path on the remote host
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn auth(&self) -> &SshAuth {
        &self.auth
    }

    pub fn session_key(&self) -> SessionKey {
        SessionKey {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            auth: self.auth.clone(),
        }
    }

    fn with_path(&self, path: String) -> Self {
        Self {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            path,
            auth: self.auth.clone(),
            cache: self.cache.clone(),
            connection: Mutex::new(Connection::default()),
        }
    }

    fn cache(&self) -> Result<Arc<SessionCache>> {
        match &self.cache {
            Some(cache) => Ok(cache.clone()),
            None => SessionCache::global(),
        }
    }

    async fn ensure_session(&self, conn: &mut Connection) -> Result<Arc<dyn Session>> {
        if let Some(session) = &conn.session
            && session.is_active()
        {
            return Ok(session.clone());
        }

        let session = self.cache()?.get(&self.session_key()).await?;
        conn.session = Some(session.clone());
        // A sub-session never outlives the session it was opened on.
        conn.sftp = None;
        Ok(session)
    }

    /// The SSH session for this path, reconnecting if it went inactive
    pub async fn session(&self) -> Result<Arc<dyn Session>> {
        let mut conn = self.connection.lock().await;
        self.ensure_session(&mut conn).await
    }

    /// The SFTP sub-session for this path, reopened if it was closed
    pub async fn sftp(&self) -> Result<Arc<dyn FileTransfer>> {
        let mut conn = self.connection.lock().await;
        let session = self.ensure_session(&mut conn).await?;

        if let Some(sftp) = &conn.sftp
            && !sftp.is_closed()
        {
            return Ok(sftp.clone());
        }

        tracing::debug!(path = %self, "Opening SFTP sub-session");
        let sftp = session.open_file_transfer().await?;
        conn.sftp = Some(sftp.clone());
        Ok(sftp)
    }
}

/// `mkdir -p` over SFTP: stat every prefix from the root down and create
/// the missing ones. A directory created by someone else between the stat
/// and the mkdir counts as created.
async fn create_tree(sftp: &dyn FileTransfer, path: &str) -> Result<()> {
    let mut current = String::new();
    for part in path.split('/').filter(|p| !p.is_empty()) {
        current.push('/');
        current.push_str(part);
        match sftp.stat(&current).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                if let Err(mkdir_err) = sftp.mkdir(&current).await {
                    match sftp.stat(&current).await {
                        Ok(stat) if stat.is_dir() => {
                            tracing::debug!(dir = %current, "Directory appeared concurrently");
                        }
                        _ => return Err(mkdir_err),
                    }
                }
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn decode(s: &str) -> Result<String> {
    urlencoding::decode(s)
        .map(|d| d.into_owned())
        .map_err(|e| Error::InvalidPath(format!("{s}: {e}")))
}

/// Collapse empty and `.` segments; the result is always absolute.
fn normalize(path: &str) -> String {
    let parts: Vec<&str> = path
        .split('/')
        .filter(|p| !p.is_empty() && *p != ".")
        .collect();
    format!("/{}", parts.join("/"))
}

fn posix_parent(path: &str) -> String {
    match path.trim_end_matches('/').rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

impl Clone for RemotePath {
    fn clone(&self) -> Self {
        self.with_path(self.path.clone())
    }
}

impl PartialEq for RemotePath {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host
            && self.port == other.port
            && self.username == other.username
            && self.path == other.path
            && self.auth == other.auth
    }
}

impl Eq for RemotePath {}

impl Hash for RemotePath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
        self.username.hash(state);
        self.path.hash(state);
        self.auth.hash(state);
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ssh://")?;
        if let Some(user) = &self.username {
            write!(f, "{user}@")?;
        }
        if self.host.contains(':') {
            write!(f, "[{}]", self.host)?;
        } else {
            write!(f, "{}", self.host)?;
        }
        write!(f, ":{}{}", self.port, self.path)
    }
}

impl fmt::Debug for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RemotePath('{self}'")?;
        if let Some(key_path) = &self.auth.key_path {
            write!(f, ", key_path='{key_path}'")?;
        }
        write!(f, ")")
    }
}

#[async_trait]
impl StoragePath for RemotePath {
    fn family(&self) -> BackendFamily {
        BackendFamily::Remote
    }

    fn is_absolute(&self) -> bool {
        true
    }

    fn name(&self) -> String {
        self.path.rsplit('/').next().unwrap_or_default().to_string()
    }

    fn parent(&self) -> Self {
        self.with_path(posix_parent(&self.path))
    }

    fn join(&self, segment: &str) -> Self {
        if segment.starts_with('/') {
            return self.with_path(normalize(segment));
        }
        self.with_path(normalize(&format!("{}/{segment}", self.path)))
    }

    async fn exists(&self) -> Result<bool> {
        match self.sftp().await?.stat(&self.path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn is_dir(&self) -> Result<bool> {
        match self.sftp().await?.stat(&self.path).await {
            Ok(stat) => Ok(stat.is_dir()),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn make_dirs(&self, recursive: bool) -> Result<()> {
        let sftp = self.sftp().await?;
        if recursive {
            create_tree(sftp.as_ref(), &self.path).await
        } else {
            sftp.mkdir(&self.path).await
        }
    }

    async fn read_bytes(&self) -> Result<Vec<u8>> {
        self.sftp().await?.read(&self.path).await
    }

    async fn write_bytes(&self, data: &[u8]) -> Result<()> {
        let sftp = self.sftp().await?;
        create_tree(sftp.as_ref(), &posix_parent(&self.path)).await?;
        sftp.write(&self.path, data).await
    }

    async fn delete(&self, missing_ok: bool) -> Result<()> {
        match self.sftp().await?.remove(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if missing_ok && e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MockConnector, MockFileTransfer, MockSession, RemoteStat};
    use mockall::predicate::eq;

    /// Cache whose single session hands out `sftp` as its sub-session
    fn cache_with(sftp: MockFileTransfer) -> Arc<SessionCache> {
        let sftp: Arc<dyn FileTransfer> = Arc::new(sftp);
        let mut session = MockSession::new();
        session.expect_is_active().return_const(true);
        session
            .expect_open_file_transfer()
            .returning(move || Ok(sftp.clone()));
        let session: Arc<dyn Session> = Arc::new(session);

        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .returning(move |_| Ok(session.clone()));
        Arc::new(SessionCache::new(Arc::new(connector)))
    }

    fn open_sftp() -> MockFileTransfer {
        let mut sftp = MockFileTransfer::new();
        sftp.expect_is_closed().return_const(false);
        sftp
    }

    fn not_found(path: &str) -> Error {
        Error::NotFound(path.to_string())
    }

    #[test]
    fn test_parse() {
        let path = RemotePath::parse("ssh://user@host:2222/path/to/file.txt").unwrap();
        assert_eq!(path.host(), "host");
        assert_eq!(path.port(), 2222);
        assert_eq!(path.username(), Some("user"));
        assert_eq!(path.path(), "/path/to/file.txt");

        let path = RemotePath::parse("ssh://host/path/to/file.txt").unwrap();
        assert_eq!(path.username(), None);
        assert_eq!(path.port(), 22);
    }

    #[test]
    fn test_parse_errors() {
        let err = RemotePath::parse("http://host/path").unwrap_err();
        assert!(err.to_string().contains("Invalid SSH URL scheme"));

        let err = RemotePath::parse("ssh:///path").unwrap_err();
        assert!(err.to_string().contains("Hostname is required"));
    }

    #[test]
    fn test_display_always_has_port() {
        let path = RemotePath::parse("ssh://host/p").unwrap();
        assert_eq!(path.to_string(), "ssh://host:22/p");

        let path = RemotePath::parse("ssh://user@host:2222/a/b.txt").unwrap();
        assert_eq!(path.to_string(), "ssh://user@host:2222/a/b.txt");
        assert_eq!(
            RemotePath::parse(&path.to_string()).unwrap().to_string(),
            path.to_string()
        );
    }

    #[test]
    fn test_debug_hides_password() {
        let path = RemotePath::parse("ssh://user@host/p")
            .unwrap()
            .with_auth(SshAuth {
                password: Some("hunter2".to_string()),
                key_path: Some("/keys/id_ed25519".to_string()),
            });
        let debug = format!("{path:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!path.to_string().contains("hunter2"));
        assert_eq!(
            debug,
            "RemotePath('ssh://user@host:22/p', key_path='/keys/id_ed25519')"
        );
    }

    #[test]
    fn test_parent_and_name() {
        let path = RemotePath::parse("ssh://user@host:2222/a/b.txt").unwrap();
        assert_eq!(path.name(), "b.txt");
        assert_eq!(path.parent().name(), "a");
        assert_eq!(path.parent().port(), 2222);
        assert_eq!(path.parent().username(), Some("user"));

        let root = RemotePath::parse("ssh://host/").unwrap();
        assert_eq!(root.parent().path(), "/");
        assert_eq!(root.name(), "");

        let top = RemotePath::parse("ssh://host/file").unwrap();
        assert_eq!(top.parent().path(), "/");
    }

    #[test]
    fn test_join_preserves_identity() {
        let base = RemotePath::parse("ssh://user@host:2200/data")
            .unwrap()
            .with_auth(SshAuth::key_path("/k"));
        let joined = base.join("raw/x.csv");
        assert_eq!(joined.to_string(), "ssh://user@host:2200/data/raw/x.csv");
        assert_eq!(joined.auth(), base.auth());
        assert_eq!(base.join("/etc/hosts").path(), "/etc/hosts");
        assert!(joined.is_absolute());
    }

    #[tokio::test]
    async fn test_sessions_are_lazy_and_cached() {
        let mut sftp = open_sftp();
        sftp.expect_stat().returning(|_| Ok(RemoteStat::default()));
        let sftp: Arc<dyn FileTransfer> = Arc::new(sftp);

        let mut session = MockSession::new();
        session.expect_is_active().return_const(true);
        session
            .expect_open_file_transfer()
            .times(1)
            .returning(move || Ok(sftp.clone()));
        let session: Arc<dyn Session> = Arc::new(session);

        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .withf(|key| {
                key.host == "host" && key.port == 22 && key.username.as_deref() == Some("user")
            })
            .times(1)
            .returning(move |_| Ok(session.clone()));
        let cache = Arc::new(SessionCache::new(Arc::new(connector)));

        let path = RemotePath::parse("ssh://user@host/path")
            .unwrap()
            .with_cache(cache);
        assert!(path.exists().await.unwrap());
        assert!(path.exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_sftp_is_reopened() {
        let mut closed = MockFileTransfer::new();
        closed.expect_is_closed().return_const(true);
        closed.expect_stat().returning(|_| Ok(RemoteStat::default()));
        let closed: Arc<dyn FileTransfer> = Arc::new(closed);

        let mut session = MockSession::new();
        session.expect_is_active().return_const(true);
        session
            .expect_open_file_transfer()
            .times(2)
            .returning(move || Ok(closed.clone()));
        let session: Arc<dyn Session> = Arc::new(session);

        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .times(1)
            .returning(move |_| Ok(session.clone()));
        let cache = Arc::new(SessionCache::new(Arc::new(connector)));

        let path = RemotePath::parse("ssh://host/p").unwrap().with_cache(cache);
        path.exists().await.unwrap();
        path.exists().await.unwrap();
    }

    #[tokio::test]
    async fn test_identical_paths_share_session() {
        let mut connector = MockConnector::new();
        connector.expect_connect().times(1).returning(|_| {
            let mut session = MockSession::new();
            session.expect_is_active().return_const(true);
            Ok(Arc::new(session) as Arc<dyn Session>)
        });
        let cache = Arc::new(SessionCache::new(Arc::new(connector)));

        let auth = SshAuth::password("pw");
        let a = RemotePath::parse("ssh://user@host/a")
            .unwrap()
            .with_auth(auth.clone())
            .with_cache(cache.clone());
        let b = RemotePath::parse("ssh://user@host/b")
            .unwrap()
            .with_auth(auth)
            .with_cache(cache);

        let first = a.session().await.unwrap();
        let second = b.session().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_exists() {
        let mut sftp = open_sftp();
        sftp.expect_stat()
            .with(eq("/file.txt"))
            .returning(|_| Ok(RemoteStat::default()));
        sftp.expect_stat()
            .with(eq("/missing.txt"))
            .returning(|p| Err(not_found(p)));
        let cache = cache_with(sftp);

        let present = RemotePath::parse("ssh://host/file.txt")
            .unwrap()
            .with_cache(cache.clone());
        let absent = RemotePath::parse("ssh://host/missing.txt")
            .unwrap()
            .with_cache(cache);
        assert!(present.exists().await.unwrap());
        assert!(!absent.exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_exists_propagates_other_errors() {
        let mut sftp = open_sftp();
        sftp.expect_stat()
            .returning(|_| Err(Error::Sftp("permission denied".to_string())));

        let path = RemotePath::parse("ssh://host/secret")
            .unwrap()
            .with_cache(cache_with(sftp));
        assert!(matches!(path.exists().await, Err(Error::Sftp(_))));
    }

    #[tokio::test]
    async fn test_is_dir() {
        let mut sftp = open_sftp();
        sftp.expect_stat().with(eq("/dir")).returning(|_| {
            Ok(RemoteStat {
                size: None,
                permissions: Some(0o040755),
            })
        });
        sftp.expect_stat()
            .with(eq("/nomode"))
            .returning(|_| Ok(RemoteStat::default()));
        sftp.expect_stat()
            .with(eq("/missing"))
            .returning(|p| Err(not_found(p)));
        let cache = cache_with(sftp);

        for (url, expected) in [
            ("ssh://host/dir", true),
            ("ssh://host/nomode", false),
            ("ssh://host/missing", false),
        ] {
            let path = RemotePath::parse(url).unwrap().with_cache(cache.clone());
            assert_eq!(path.is_dir().await.unwrap(), expected, "{url}");
        }
    }

    #[tokio::test]
    async fn test_make_dirs_recursive_creates_missing_levels() {
        let mut sftp = open_sftp();
        sftp.expect_stat()
            .with(eq("/a"))
            .returning(|_| Ok(RemoteStat::default()));
        sftp.expect_stat()
            .with(eq("/a/b"))
            .times(1)
            .returning(|p| Err(not_found(p)));
        sftp.expect_stat()
            .with(eq("/a/b/c"))
            .times(1)
            .returning(|p| Err(not_found(p)));
        sftp.expect_mkdir().with(eq("/a/b")).times(1).returning(|_| Ok(()));
        sftp.expect_mkdir()
            .with(eq("/a/b/c"))
            .times(1)
            .returning(|_| Ok(()));

        let path = RemotePath::parse("ssh://host/a/b/c")
            .unwrap()
            .with_cache(cache_with(sftp));
        path.make_dirs(true).await.unwrap();
    }

    #[tokio::test]
    async fn test_make_dirs_recursive_is_idempotent() {
        let mut sftp = open_sftp();
        sftp.expect_stat().returning(|_| {
            Ok(RemoteStat {
                size: None,
                permissions: Some(0o040755),
            })
        });
        sftp.expect_mkdir().never();

        let path = RemotePath::parse("ssh://host/a/b")
            .unwrap()
            .with_cache(cache_with(sftp));
        path.make_dirs(true).await.unwrap();
        path.make_dirs(true).await.unwrap();
    }

    #[tokio::test]
    async fn test_make_dirs_single_level() {
        let mut sftp = open_sftp();
        sftp.expect_stat().never();
        sftp.expect_mkdir()
            .with(eq("/a/b"))
            .times(1)
            .returning(|p| Err(not_found(p)));

        let path = RemotePath::parse("ssh://host/a/b")
            .unwrap()
            .with_cache(cache_with(sftp));
        assert!(path.make_dirs(false).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_write_bytes_creates_parent_then_writes() {
        let mut sftp = open_sftp();
        let mut seq = mockall::Sequence::new();
        sftp.expect_stat()
            .with(eq("/out"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|p| Err(not_found(p)));
        sftp.expect_mkdir()
            .with(eq("/out"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        sftp.expect_write()
            .withf(|path, data| path == "/out/a.txt" && data == b"x")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let path = RemotePath::parse("ssh://host/out/a.txt")
            .unwrap()
            .with_cache(cache_with(sftp));
        path.write_bytes(b"x").await.unwrap();
    }

    #[tokio::test]
    async fn test_write_bytes_tolerates_parent_created_concurrently() {
        let mut sftp = open_sftp();
        let mut seq = mockall::Sequence::new();
        sftp.expect_stat()
            .with(eq("/out"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|p| Err(not_found(p)));
        sftp.expect_mkdir()
            .with(eq("/out"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|p| Err(Error::Sftp(format!("{p}: Failure"))));
        sftp.expect_stat()
            .with(eq("/out"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(RemoteStat {
                    size: None,
                    permissions: Some(0o040755),
                })
            });
        sftp.expect_write()
            .withf(|path, data| path == "/out/a.txt" && data == b"x")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let path = RemotePath::parse("ssh://host/out/a.txt")
            .unwrap()
            .with_cache(cache_with(sftp));
        path.write_bytes(b"x").await.unwrap();
    }

    #[tokio::test]
    async fn test_make_dirs_reports_mkdir_failure_when_still_missing() {
        let mut sftp = open_sftp();
        sftp.expect_stat().returning(|p| Err(not_found(p)));
        sftp.expect_mkdir()
            .with(eq("/locked"))
            .times(1)
            .returning(|p| Err(Error::Sftp(format!("{p}: Failure"))));

        let path = RemotePath::parse("ssh://host/locked")
            .unwrap()
            .with_cache(cache_with(sftp));
        let err = path.make_dirs(true).await.unwrap_err();
        assert!(matches!(err, Error::Sftp(msg) if msg == "/locked: Failure"));
    }

    #[test]
    fn test_ipv6_host_is_unbracketed() {
        let path = RemotePath::parse("ssh://user@[::1]:2222/data").unwrap();
        assert_eq!(path.host(), "::1");
        assert_eq!(path.session_key().host, "::1");
        assert_eq!(path.to_string(), "ssh://user@[::1]:2222/data");
        assert_eq!(
            RemotePath::parse(&path.to_string()).unwrap().host(),
            "::1"
        );
    }

    #[tokio::test]
    async fn test_read_text() {
        let mut sftp = open_sftp();
        sftp.expect_read()
            .with(eq("/hello.txt"))
            .returning(|_| Ok("héllo".as_bytes().to_vec()));

        let path = RemotePath::parse("ssh://host/hello.txt")
            .unwrap()
            .with_cache(cache_with(sftp));
        assert_eq!(
            path.read_text(Default::default()).await.unwrap(),
            "héllo"
        );
    }

    #[tokio::test]
    async fn test_delete_missing() {
        let mut sftp = open_sftp();
        sftp.expect_remove().returning(|p| Err(not_found(p)));
        let path = RemotePath::parse("ssh://host/gone")
            .unwrap()
            .with_cache(cache_with(sftp));

        path.delete(true).await.unwrap();
        assert!(path.delete(false).await.unwrap_err().is_not_found());
    }
}
