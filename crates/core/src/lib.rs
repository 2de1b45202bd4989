//! dt-core: Core library for the datatool storage CLI
//!
//! This crate provides the backend-independent pieces of datatool:
//! - Path handles for local files, cloud objects and SSH hosts
//! - The SSH session cache shared by remote paths
//! - The transfer engine and its per-backend-pair strategies
//! - Storage configuration and the cached-content file wrapper
//!
//! No cloud SDK or SSH library is linked here. Concrete backends implement
//! [`ObjectStore`] and [`Connector`] in their own crates.

pub mod config;
pub mod error;
pub mod file;
pub mod path;
pub mod session;
pub mod traits;
pub mod transfer;

pub use config::{Config, ConfigManager, Environment, Settings};
pub use error::{Error, Result};
pub use file::{BytesCodec, BytesFile, Codec, File, FileRef, JsonCodec, JsonFile, TextCodec, TextFile};
pub use path::{
    BackendFamily, Backends, CloudPath, CloudScheme, DecodeErrors, LocalPath, PathHandle,
    PathResolver, RemotePath, StoragePath, StoreRegistry, resolve,
};
pub use session::{
    Connector, FileTransfer, RemoteStat, Session, SessionCache, SessionKey, SessionRegistry,
    SshAuth,
};
pub use traits::{ObjectInfo, ObjectStore};
pub use transfer::{StrategyTable, TransferEngine, TransferStrategy, transfer_file};
