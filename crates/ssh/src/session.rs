//! SSH sessions and SFTP channels

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use russh::Disconnect;
use russh::client::Handle;
use russh_sftp::client::SftpSession;
use russh_sftp::client::error::Error as SftpError;
use russh_sftp::protocol::StatusCode;
use tokio::io::AsyncWriteExt;

use dt_core::{Error, FileTransfer, RemoteStat, Result, Session};

use crate::connector::TrustingHandler;

/// An authenticated russh connection
pub struct RusshSession {
    handle: Handle<TrustingHandler>,
    label: String,
}

impl RusshSession {
    pub(crate) fn new(handle: Handle<TrustingHandler>, label: String) -> Self {
        Self { handle, label }
    }
}

#[async_trait]
impl Session for RusshSession {
    fn is_active(&self) -> bool {
        !self.handle.is_closed()
    }

    async fn open_file_transfer(&self) -> Result<Arc<dyn FileTransfer>> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::Connection(format!("SSH channel open on {}: {e}", self.label)))?;

        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| Error::Sftp(format!("SFTP subsystem on {}: {e}", self.label)))?;

        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| Error::Sftp(format!("SFTP session init on {}: {e}", self.label)))?;

        tracing::debug!(session = %self.label, "SFTP channel open");
        Ok(Arc::new(SftpChannel::new(sftp)))
    }

    async fn close(&self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "Client disconnecting", "en")
            .await
        {
            tracing::debug!(session = %self.label, error = %e, "SSH disconnect failed");
        } else {
            tracing::debug!(session = %self.label, "SSH session closed");
        }
    }
}

/// [`FileTransfer`] over a russh-sftp session
pub struct SftpChannel {
    sftp: SftpSession,
    closed: AtomicBool,
}

impl SftpChannel {
    fn new(sftp: SftpSession) -> Self {
        Self {
            sftp,
            closed: AtomicBool::new(false),
        }
    }

    /// Map an SFTP error for `path`. Anything other than a status reply
    /// means the channel is unusable.
    fn map_error(&self, error: SftpError, path: &str) -> Error {
        let mapped = map_sftp_error(error, path);
        if matches!(mapped, Error::Network(_)) {
            self.closed.store(true, Ordering::Relaxed);
        }
        mapped
    }
}

fn map_sftp_error(error: SftpError, path: &str) -> Error {
    match error {
        SftpError::Status(status) => match status.status_code {
            StatusCode::NoSuchFile => Error::NotFound(path.to_string()),
            StatusCode::PermissionDenied => Error::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("{path}: {}", status.error_message),
            )),
            _ => Error::Sftp(format!("{path}: {}", status.error_message)),
        },
        other => Error::Network(format!("SFTP {path}: {other}")),
    }
}

#[async_trait]
impl FileTransfer for SftpChannel {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    async fn stat(&self, path: &str) -> Result<RemoteStat> {
        let attrs = self
            .sftp
            .metadata(path)
            .await
            .map_err(|e| self.map_error(e, path))?;
        Ok(RemoteStat {
            size: attrs.size,
            permissions: attrs.permissions,
        })
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        self.sftp
            .create_dir(path)
            .await
            .map_err(|e| self.map_error(e, path))
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.sftp
            .read(path)
            .await
            .map_err(|e| self.map_error(e, path))
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let mut file = self
            .sftp
            .create(path)
            .await
            .map_err(|e| self.map_error(e, path))?;
        file.write_all(data)
            .await
            .map_err(|e| Error::Sftp(format!("{path}: {e}")))?;
        file.shutdown()
            .await
            .map_err(|e| Error::Sftp(format!("{path}: {e}")))?;
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.sftp
            .remove_file(path)
            .await
            .map_err(|e| self.map_error(e, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use russh_sftp::protocol::Status;

    fn status(code: StatusCode, message: &str) -> SftpError {
        SftpError::Status(Status {
            id: 1,
            status_code: code,
            error_message: message.to_string(),
            language_tag: "en-US".to_string(),
        })
    }

    #[test]
    fn test_no_such_file_is_not_found() {
        let err = map_sftp_error(status(StatusCode::NoSuchFile, "No such file"), "/a");
        assert!(err.is_not_found());
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn test_permission_denied_is_auth_exit_code() {
        let err = map_sftp_error(status(StatusCode::PermissionDenied, "denied"), "/root");
        assert!(!err.is_not_found());
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_other_status_is_sftp_error() {
        let err = map_sftp_error(status(StatusCode::Failure, "mkdir failed"), "/a/b");
        assert!(matches!(err, Error::Sftp(msg) if msg == "/a/b: mkdir failed"));
    }
}
