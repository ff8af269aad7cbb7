//! Configuration module for slugshot
//!
//! Locates the library database, the managed storage root and the release
//! registry. Configuration is stored in the user's config directory and can
//! be overridden from the environment (`SLUGSHOT_STORAGE__ROOT=...`).
//!
//! Feature flags are not configured here; they live in the library's option
//! tree (see [`crate::options`]).

mod setup;

pub use setup::first_time_setup;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "slugshot";

/// Default number of items per bulk batch
pub const DEFAULT_BATCH_SIZE: u32 = 25;

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn default_library() -> PathBuf {
    data_dir().join("library")
}

fn default_storage_root() -> PathBuf {
    data_dir().join("uploads")
}

fn default_base_url() -> String {
    "http://localhost/uploads".to_string()
}

const fn default_batch_size() -> u32 {
    DEFAULT_BATCH_SIZE
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_owner() -> String {
    "xerinox".to_string()
}

fn default_repo() -> String {
    APP_DIR.to_string()
}

fn default_package_name() -> String {
    format!("{APP_DIR}.zip")
}

fn default_cache_file() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("release.json")
}

fn default_level() -> String {
    "info".to_string()
}

/// Where managed media files live and how they are addressed publicly
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Root directory every attachment file must stay below
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,

    /// Public URL of `root`
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            base_url: default_base_url(),
        }
    }
}

impl StorageConfig {
    /// Public URL for a path relative to the storage root
    #[must_use]
    pub fn url_for(&self, relative: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            relative.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct BulkConfig {
    /// Suggested batch size handed to bulk clients (clamped to 5..=50)
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// GitHub-style release registry this installation updates from
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_owner")]
    pub owner: String,

    #[serde(default = "default_repo")]
    pub repo: String,

    /// Release asset preferred as the update package
    #[serde(default = "default_package_name")]
    pub package_name: String,

    /// On-disk copy of the last successful release lookup
    #[serde(default = "default_cache_file")]
    pub cache_file: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            owner: default_owner(),
            repo: default_repo(),
            package_name: default_package_name(),
            cache_file: default_cache_file(),
        }
    }
}

impl RegistryConfig {
    /// Releases page of the repository, advertised as the homepage
    #[must_use]
    pub fn homepage(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.repo)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive used when `SLUGSHOT_LOG` is unset
    #[serde(default = "default_level")]
    pub level: String,

    /// Also append logs to this file
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: None,
        }
    }
}

/// Application configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SlugshotConfig {
    /// Path of the sled library database
    #[serde(default = "default_library")]
    pub library: PathBuf,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub bulk: BulkConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for SlugshotConfig {
    fn default() -> Self {
        Self {
            library: default_library(),
            storage: StorageConfig::default(),
            bulk: BulkConfig::default(),
            registry: RegistryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl SlugshotConfig {
    /// Get the path to the config file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the system config directory cannot be determined.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            ConfigError::Message("Could not determine config directory".to_string())
        })?;

        Ok(config_dir.join(APP_DIR).join("config.toml"))
    }

    /// Load configuration from the default location
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the config file cannot be read, parsed, or created.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, writing defaults there if it doesn't exist
    ///
    /// Environment variables prefixed with `SLUGSHOT_` override file values;
    /// nested keys are separated by `__`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read, parsed, or created.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            Self::default().save_to(path)?;
        }

        let settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml))
            .add_source(
                Environment::with_prefix("SLUGSHOT")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        settings.try_deserialize()
    }

    /// Save configuration to the default location
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the config path cannot be determined or written.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to `path`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the config directory cannot be created, the configuration
    /// cannot be serialized to TOML, or the file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ConfigError::Message(format!("Failed to create config directory: {e}"))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Message(format!("Failed to serialize config: {e}")))?;

        fs::write(path, toml_string)
            .map_err(|e| ConfigError::Message(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Load configuration, running first-time setup if config doesn't exist
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if loading or creating the configuration fails.
    pub fn load_or_setup() -> Result<Self, ConfigError> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load()
        } else {
            first_time_setup()
        }
    }
}
