//! Configuration
//!
//! [`Config`] is the runtime context for file storage: where files live and
//! which date-partitioned folders they go in. [`ConfigManager`] reads the
//! optional `config.toml` that provides defaults for the CLI.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use jiff::Zoned;
use jiff::civil::DateTime;
use jiff::tz::TimeZone;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::path::{PathHandle, StoragePath, resolve};

/// strftime format of the date folders files are stored under
pub const DEFAULT_STORAGE_FOLDER_FMT: &str = "%Y/%m/%d";

/// Format accepted by [`Config::with_datetime_str`] by default
pub const DEFAULT_DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "DT_CONFIG_DIR";

const CONFIG_FILE: &str = "config.toml";

/// Deployment environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Test,
    Prod,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Dev => write!(f, "dev"),
            Environment::Test => write!(f, "test"),
            Environment::Prod => write!(f, "prod"),
        }
    }
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "test" => Ok(Environment::Test),
            "prod" => Ok(Environment::Prod),
            other => Err(Error::Config(format!("Unknown environment: {other}"))),
        }
    }
}

/// Storage context for a process run
#[derive(Debug, Clone)]
pub struct Config {
    storage_root: PathHandle,
    datetime: Zoned,
    storage_folder_fmt: String,
    process_name: Option<String>,
    environment: Environment,
}

impl Config {
    /// Store files under `storage_root`, dated now
    pub fn new(storage_root: impl Into<PathHandle>) -> Self {
        Self {
            storage_root: storage_root.into(),
            datetime: Zoned::now(),
            storage_folder_fmt: DEFAULT_STORAGE_FOLDER_FMT.to_string(),
            process_name: None,
            environment: Environment::default(),
        }
    }

    /// Like [`Config::new`], resolving the root from a string
    pub fn for_root(storage_root: &str) -> Result<Self> {
        Ok(Self::new(resolve(storage_root)?))
    }

    pub fn with_datetime(mut self, datetime: Zoned) -> Self {
        self.datetime = datetime;
        self
    }

    /// Parse a civil datetime with strftime `fmt` and interpret it as UTC
    pub fn with_datetime_str(self, datetime: &str, fmt: &str) -> Result<Self> {
        let civil = DateTime::strptime(fmt, datetime)
            .map_err(|e| Error::Config(format!("Invalid datetime '{datetime}': {e}")))?;
        let zoned = civil
            .to_zoned(TimeZone::UTC)
            .map_err(|e| Error::Config(format!("Invalid datetime '{datetime}': {e}")))?;
        Ok(self.with_datetime(zoned))
    }

    pub fn with_folder_fmt(mut self, fmt: impl Into<String>) -> Self {
        self.storage_folder_fmt = fmt.into();
        self
    }

    pub fn with_process_name(mut self, name: impl Into<String>) -> Self {
        self.process_name = Some(name.into());
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn storage_root(&self) -> &PathHandle {
        &self.storage_root
    }

    pub fn datetime(&self) -> &Zoned {
        &self.datetime
    }

    pub fn process_name(&self) -> Option<&str> {
        self.process_name.as_deref()
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Date folders for this run, e.g. `2024/03/07`
    pub fn storage_folders(&self) -> String {
        self.datetime.strftime(&self.storage_folder_fmt).to_string()
    }

    /// Where a file called `name` is stored under `subdir`.
    ///
    /// A bare extension such as `.log` names the date itself, giving
    /// `root/subdir/2024/03/07.log`. Any other name goes inside the date
    /// folders: `root/subdir/2024/03/07/name`.
    pub fn file_storage_path(&self, name: &str, subdir: &str) -> PathHandle {
        let base = if subdir.is_empty() {
            self.storage_root.clone()
        } else {
            self.storage_root.join(subdir)
        };

        let folders = self.storage_folders();
        if is_bare_extension(name) {
            base.join(&format!("{folders}{name}"))
        } else {
            base.join(&folders).join(name)
        }
    }
}

fn is_bare_extension(name: &str) -> bool {
    name.starts_with('.') && name.matches('.').count() == 1
}

/// `[storage]` table of the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub root: String,
    pub folder_format: String,
    pub environment: Environment,
    pub process_name: Option<String>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: ".".to_string(),
            folder_format: DEFAULT_STORAGE_FOLDER_FMT.to_string(),
            environment: Environment::default(),
            process_name: None,
        }
    }
}

/// `[ssh]` table of the config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshSettings {
    /// Private key used when none is given on the command line
    pub key_path: Option<String>,
}

/// `[s3]` table of the config file
///
/// Credentials are not read from here; the AWS default chain applies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Settings {
    /// Custom endpoint for S3-compatible services
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub force_path_style: bool,
}

/// Contents of `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage: StorageSettings,
    pub ssh: SshSettings,
    pub s3: S3Settings,
}

impl Settings {
    /// Runtime storage context described by the `[storage]` table
    pub fn to_config(&self) -> Result<Config> {
        let mut config = Config::for_root(&self.storage.root)?
            .with_folder_fmt(self.storage.folder_format.clone())
            .with_environment(self.storage.environment);
        config.process_name = self.storage.process_name.clone();
        Ok(config)
    }
}

/// Locates and loads the config file
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: PathBuf,
}

impl ConfigManager {
    /// Use `$DT_CONFIG_DIR`, else the platform config directory
    pub fn new() -> Result<Self> {
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
            return Ok(Self::with_dir(dir));
        }
        let base = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;
        Ok(Self::with_dir(base.join("datatool")))
    }

    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: dir.into(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// Read the config file; a missing file yields defaults
    pub fn load(&self) -> Result<Settings> {
        let path = self.config_path();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Settings::default());
            }
            Err(e) => return Err(e.into()),
        };

        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {e}", path.display())))
    }

    /// Write `settings`, creating the config directory if needed
    pub fn save(&self, settings: &Settings) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        let content = toml::to_string_pretty(settings)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(self.config_path(), content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::{CloudPath, LocalPath};
    use tempfile::TempDir;

    fn dated(root: impl Into<PathHandle>) -> Config {
        Config::new(root)
            .with_datetime_str("2024-03-07 10:30:00", DEFAULT_DATETIME_FMT)
            .unwrap()
    }

    #[test]
    fn test_storage_folders() {
        let config = dated(LocalPath::new("/data"));
        assert_eq!(config.storage_folders(), "2024/03/07");
        assert_eq!(config.datetime().hour(), 10);

        let config = config.with_folder_fmt("%Y-%m");
        assert_eq!(config.storage_folders(), "2024-03");
    }

    #[test]
    fn test_file_storage_path_with_name() {
        let config = dated(LocalPath::new("/data"));
        let path = config.file_storage_path("report.csv", "raw");
        assert_eq!(path.to_string(), "/data/raw/2024/03/07/report.csv");
    }

    #[test]
    fn test_file_storage_path_bare_extension() {
        let config = dated(LocalPath::new("/data"));
        let path = config.file_storage_path(".log", "logs");
        assert_eq!(path.to_string(), "/data/logs/2024/03/07.log");

        // More than one dot is an ordinary name.
        let path = config.file_storage_path(".tar.gz", "logs");
        assert_eq!(path.to_string(), "/data/logs/2024/03/07/.tar.gz");
    }

    #[test]
    fn test_file_storage_path_cloud_root_without_subdir() {
        let config = dated(CloudPath::parse("s3://bucket/base").unwrap());
        let path = config.file_storage_path("a.json", "");
        assert_eq!(path.to_string(), "s3://bucket/base/2024/03/07/a.json");
    }

    #[test]
    fn test_invalid_datetime() {
        let err = Config::new(LocalPath::new("."))
            .with_datetime_str("yesterday", DEFAULT_DATETIME_FMT)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!("PROD".parse::<Environment>().unwrap(), Environment::Prod);
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_dir(dir.path());
        let settings = manager.load().unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.storage.folder_format, "%Y/%m/%d");
    }

    #[test]
    fn test_load_partial_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            r#"
[storage]
root = "s3://bucket/landing"
environment = "prod"

[ssh]
key_path = "/home/me/.ssh/id_ed25519"
"#,
        )
        .unwrap();

        let settings = ConfigManager::with_dir(dir.path()).load().unwrap();
        assert_eq!(settings.storage.root, "s3://bucket/landing");
        assert_eq!(settings.storage.folder_format, DEFAULT_STORAGE_FOLDER_FMT);
        assert_eq!(
            settings.ssh.key_path.as_deref(),
            Some("/home/me/.ssh/id_ed25519")
        );
        assert!(!settings.s3.force_path_style);

        let config = settings.to_config().unwrap();
        assert_eq!(config.environment(), Environment::Prod);
        assert_eq!(config.storage_root().to_string(), "s3://bucket/landing");
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.toml"), "[storage\nroot = 1").unwrap();
        let err = ConfigManager::with_dir(dir.path()).load().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_dir(dir.path().join("nested"));
        let mut settings = Settings::default();
        settings.s3.endpoint = Some("http://localhost:9000".to_string());
        settings.s3.force_path_style = true;

        manager.save(&settings).unwrap();
        assert_eq!(manager.load().unwrap(), settings);
    }
}
