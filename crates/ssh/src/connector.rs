//! Connecting and authenticating with russh

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Config, Handle};
use russh::keys::{HashAlg, PrivateKeyWithHashAlg, PublicKey};

use dt_core::{Connector, Error, Result, Session, SessionKey, SshAuth};

use crate::session::RusshSession;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
const KEEPALIVE_MAX: usize = 3;

/// Keys tried, in order, when no key file is given
const DEFAULT_KEY_FILES: [&str; 3] = ["id_ed25519", "id_ecdsa", "id_rsa"];

/// Client handler for russh
///
/// Host keys are accepted without a known_hosts check; the fingerprint is
/// logged so it can be audited.
pub(crate) struct TrustingHandler {
    host: String,
}

impl client::Handler for TrustingHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        tracing::warn!(
            host = %self.host,
            fingerprint = %server_public_key.fingerprint(HashAlg::Sha256),
            "Accepting SSH host key without verification"
        );
        Ok(true)
    }
}

/// [`Connector`] backed by russh
pub struct RusshConnector {
    config: Arc<Config>,
}

impl RusshConnector {
    pub fn new() -> Self {
        let config = Config {
            keepalive_interval: Some(KEEPALIVE_INTERVAL),
            keepalive_max: KEEPALIVE_MAX,
            ..<_>::default()
        };
        Self::with_config(config)
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl Default for RusshConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for RusshConnector {
    async fn connect(&self, key: &SessionKey) -> Result<Arc<dyn Session>> {
        let username = key.username.clone().unwrap_or_else(whoami::username);
        let handler = TrustingHandler {
            host: key.host.clone(),
        };

        let mut handle = client::connect(self.config.clone(), (key.host.as_str(), key.port), handler)
            .await
            .map_err(|e| Error::Connection(format!("SSH connect to {key}: {e}")))?;

        tracing::debug!(session = %key, "Connected, authenticating");
        authenticate(&mut handle, &username, &key.auth).await?;

        Ok(Arc::new(RusshSession::new(handle, key.to_string())))
    }
}

fn connection_error(user: &str, e: impl std::fmt::Display) -> Error {
    Error::Connection(format!("SSH auth as {user}: {e}"))
}

/// Password, then key file(s), then the SSH agent
async fn authenticate(
    handle: &mut Handle<TrustingHandler>,
    user: &str,
    auth: &SshAuth,
) -> Result<()> {
    if let Some(password) = &auth.password {
        let result = handle
            .authenticate_password(user, password)
            .await
            .map_err(|e| connection_error(user, e))?;
        if result.success() {
            tracing::info!(user, "Authenticated with password");
            return Ok(());
        }
        tracing::debug!(user, "Password rejected");
    }

    let hash_alg = handle
        .best_supported_rsa_hash()
        .await
        .ok()
        .flatten()
        .flatten();

    for key_file in key_files(auth) {
        let key = match russh::keys::load_secret_key(&key_file, None) {
            Ok(key) => key,
            Err(e) if auth.key_path.is_some() => {
                return Err(Error::Connection(format!(
                    "Failed to load SSH key {}: {e}",
                    key_file.display()
                )));
            }
            Err(e) => {
                tracing::debug!(key = %key_file.display(), error = %e, "Skipping SSH key");
                continue;
            }
        };

        let result = handle
            .authenticate_publickey(user, PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg))
            .await
            .map_err(|e| connection_error(user, e))?;
        if result.success() {
            tracing::info!(user, key = %key_file.display(), "Authenticated with key");
            return Ok(());
        }
        tracing::debug!(key = %key_file.display(), "Key rejected");
    }

    if authenticate_with_agent(handle, user, hash_alg).await {
        return Ok(());
    }

    Err(Error::Connection(format!("Authentication failed for {user}")))
}

#[cfg(unix)]
async fn authenticate_with_agent(
    handle: &mut Handle<TrustingHandler>,
    user: &str,
    hash_alg: Option<HashAlg>,
) -> bool {
    use russh::keys::agent::client::AgentClient;

    let mut agent = match AgentClient::connect_env().await {
        Ok(agent) => agent,
        Err(e) => {
            tracing::debug!(error = %e, "No SSH agent available");
            return false;
        }
    };

    let keys = match agent.request_identities().await {
        Ok(keys) => keys,
        Err(e) => {
            tracing::debug!(error = %e, "SSH agent did not list identities");
            return false;
        }
    };

    for key in keys {
        match handle
            .authenticate_publickey_with(user, key.clone(), hash_alg, &mut agent)
            .await
        {
            Ok(result) if result.success() => {
                tracing::info!(
                    user,
                    key = %key.fingerprint(HashAlg::Sha256),
                    "Authenticated with agent key"
                );
                return true;
            }
            Ok(_) => tracing::debug!("Agent key rejected, trying next"),
            Err(e) => tracing::warn!(error = %e, "Auth error with agent key"),
        }
    }
    false
}

#[cfg(not(unix))]
async fn authenticate_with_agent(
    _handle: &mut Handle<TrustingHandler>,
    _user: &str,
    _hash_alg: Option<HashAlg>,
) -> bool {
    false
}

/// Key files to try: the configured one, else the usual defaults in `~/.ssh`
fn key_files(auth: &SshAuth) -> Vec<PathBuf> {
    if let Some(key_path) = &auth.key_path {
        return vec![expand_tilde(key_path)];
    }

    let Some(ssh_dir) = dirs::home_dir().map(|home| home.join(".ssh")) else {
        return Vec::new();
    };
    DEFAULT_KEY_FILES
        .iter()
        .map(|name| ssh_dir.join(name))
        .filter(|path| path.exists())
        .collect()
}

/// Expand a leading `~` to the home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}
