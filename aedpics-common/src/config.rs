//! Configuration loading and root folder resolution
//!
//! Resolution priority, highest first:
//! 1. Command-line argument
//! 2. Environment variable (`AEDPICS_*`)
//! 3. TOML config file
//! 4. OS-dependent compiled default
//!
//! A missing or unreadable TOML file never aborts startup: the resolver logs
//! a warning and falls through to the next tier.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "aedpics.db";

/// Object storage directory inside the root folder
pub const STORAGE_DIR: &str = "storage";

/// Default listen address for the API service
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:5780";

/// Default lifetime of a login session
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;

/// Default lifetime of a cached token → user lookup
pub const DEFAULT_USER_CACHE_TTL_SECS: u64 = 60;

/// Upload limit for inspection photos (10 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Compiled-in defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: "info".to_string(),
        }
    }
}

/// Logging section of the TOML file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// On-disk TOML configuration
///
/// Every field is optional so older files keep parsing when keys are added.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub root_folder: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub bind_address: Option<String>,
    #[serde(default)]
    pub session_ttl_hours: Option<i64>,
    #[serde(default)]
    pub user_cache_ttl_secs: Option<u64>,
    #[serde(default)]
    pub vapid_public_key: Option<String>,
    #[serde(default)]
    pub phone_encryption_key: Option<String>,
    #[serde(default)]
    pub max_upload_bytes: Option<usize>,
}

impl TomlConfig {
    /// Parse a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
    }

    /// Load the first config file found in the standard locations
    ///
    /// Returns the default (empty) config when no file exists or it fails to parse.
    pub fn load_or_default(module_name: &str) -> Self {
        match config_file_path(module_name) {
            Some(path) => match Self::load(&path) {
                Ok(config) => {
                    debug!("Loaded config file {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("{}; using defaults", e);
                    Self::default()
                }
            },
            None => Self::default(),
        }
    }
}

/// Root folder resolution across CLI, environment, TOML and defaults
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
        }
    }

    /// Attach the value given on the command line (highest priority)
    pub fn with_cli_arg(mut self, cli_arg: Option<PathBuf>) -> Self {
        self.cli_arg = cli_arg;
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        // AEDPICS_ROOT_FOLDER wins over the shorter AEDPICS_ROOT
        for var in ["AEDPICS_ROOT_FOLDER", "AEDPICS_ROOT"] {
            if let Ok(path) = std::env::var(var) {
                if !path.trim().is_empty() {
                    return PathBuf::from(path);
                }
            }
        }

        if let Some(root) = TomlConfig::load_or_default(&self.module_name).root_folder {
            return root;
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder and derives paths inside it
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    /// Create the root folder (and parents) if missing; idempotent
    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder)?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }

    pub fn storage_path(&self) -> PathBuf {
        self.root_folder.join(STORAGE_DIR)
    }
}

/// Fully resolved service settings
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_address: String,
    pub session_ttl_hours: i64,
    pub user_cache_ttl_secs: u64,
    pub vapid_public_key: Option<String>,
    pub phone_encryption_key: String,
    pub max_upload_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            user_cache_ttl_secs: DEFAULT_USER_CACHE_TTL_SECS,
            vapid_public_key: None,
            phone_encryption_key: String::new(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl ServiceConfig {
    /// Merge environment variables over TOML values over defaults
    ///
    /// CLI overrides are applied by the binary after this call.
    pub fn resolve(toml: &TomlConfig) -> Result<Self> {
        let defaults = Self::default();

        let bind_address = env_string("AEDPICS_BIND_ADDRESS")
            .or_else(|| toml.bind_address.clone())
            .unwrap_or(defaults.bind_address);

        let session_ttl_hours = match env_string("AEDPICS_SESSION_TTL_HOURS") {
            Some(v) => parse_env("AEDPICS_SESSION_TTL_HOURS", &v)?,
            None => toml.session_ttl_hours.unwrap_or(defaults.session_ttl_hours),
        };
        if session_ttl_hours <= 0 {
            return Err(Error::Config(format!(
                "session_ttl_hours must be positive, got {}",
                session_ttl_hours
            )));
        }

        let user_cache_ttl_secs = match env_string("AEDPICS_USER_CACHE_TTL_SECS") {
            Some(v) => parse_env("AEDPICS_USER_CACHE_TTL_SECS", &v)?,
            None => toml.user_cache_ttl_secs.unwrap_or(defaults.user_cache_ttl_secs),
        };

        let max_upload_bytes = match env_string("AEDPICS_MAX_UPLOAD_BYTES") {
            Some(v) => parse_env("AEDPICS_MAX_UPLOAD_BYTES", &v)?,
            None => toml.max_upload_bytes.unwrap_or(defaults.max_upload_bytes),
        };

        let vapid_public_key =
            env_string("AEDPICS_VAPID_PUBLIC_KEY").or_else(|| toml.vapid_public_key.clone());

        let phone_encryption_key = env_string("AEDPICS_PHONE_ENCRYPTION_KEY")
            .or_else(|| toml.phone_encryption_key.clone())
            .unwrap_or_default();
        if phone_encryption_key.trim().is_empty() {
            return Err(Error::Config(
                "phone_encryption_key is required (set AEDPICS_PHONE_ENCRYPTION_KEY or the config file)"
                    .to_string(),
            ));
        }

        Ok(Self {
            bind_address,
            session_ttl_hours,
            user_cache_ttl_secs,
            vapid_public_key,
            phone_encryption_key,
            max_upload_bytes,
        })
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} has invalid value '{}'", name, value)))
}

/// First existing config file for this module
///
/// Linux checks `~/.config/aedpics/<module>.toml`, then
/// `~/.config/aedpics/config.toml`, then `/etc/aedpics/config.toml`.
fn config_file_path(module_name: &str) -> Option<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("aedpics").join(format!("{}.toml", module_name)));
        candidates.push(dir.join("aedpics").join("config.toml"));
    }
    if cfg!(target_os = "linux") {
        candidates.push(PathBuf::from("/etc/aedpics/config.toml"));
    }
    candidates.into_iter().find(|p| p.exists())
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("aedpics"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/aedpics"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("aedpics"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/aedpics"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("aedpics"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\aedpics"))
    } else {
        PathBuf::from("./aedpics_data")
    }
}
