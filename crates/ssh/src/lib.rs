//! dt-ssh: SSH/SFTP transport for datatool
//!
//! Implements the `Connector`, `Session` and `FileTransfer` traits from
//! dt-core on top of russh and russh-sftp. Install a [`RusshConnector`] into
//! the process-wide `SessionCache` with [`install`].

mod connector;
mod session;

use std::sync::Arc;

use dt_core::SessionCache;

pub use connector::RusshConnector;
pub use session::{RusshSession, SftpChannel};

/// Install a session cache backed by russh as the process-wide cache
pub fn install() -> Arc<SessionCache> {
    SessionCache::install(Arc::new(SessionCache::new(Arc::new(RusshConnector::new()))))
}
