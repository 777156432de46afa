//! Configuration loading and resolution
//!
//! Each setting resolves independently, highest priority first:
//! 1. Command-line argument
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default
//!
//! A missing default config file is not an error: the client warns and
//! continues with defaults. An explicitly requested file that cannot be
//! read or parsed is.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Backend base URL used when nothing else is configured
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

/// Largest accepted upload (5 MiB)
pub const DEFAULT_MAX_FILE_BYTES: u64 = 5 * 1024 * 1024;

/// Failed attempts per slot before the user must restart the session
pub const DEFAULT_MAX_UPLOAD_ATTEMPTS: u32 = 3;

pub const ENV_API_URL: &str = "FESTREG_API_URL";
pub const ENV_TOKEN: &str = "FESTREG_TOKEN";
pub const ENV_DATA_FOLDER: &str = "FESTREG_DATA_FOLDER";

/// Database file name inside the data folder
const DATABASE_FILE: &str = "festreg.db";

/// Contents of `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Backend base URL, e.g. `https://fest.example.edu`
    #[serde(default)]
    pub api_base_url: Option<String>,

    /// Bearer token sent to the backend
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Folder holding the session database
    #[serde(default)]
    pub data_folder: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub uploads: UploadConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level (trace, debug, info, warn, error); `RUST_LOG` overrides
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

/// File selection and retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    /// 0 disables the retry ceiling
    #[serde(default = "default_max_upload_attempts")]
    pub max_upload_attempts: u32,

    /// Accept PDF files in slots that allow documents
    #[serde(default = "default_allow_pdf")]
    pub allow_pdf: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            max_upload_attempts: default_max_upload_attempts(),
            allow_pdf: default_allow_pdf(),
        }
    }
}

impl UploadConfig {
    /// Retry ceiling, `None` when disabled
    pub fn retry_ceiling(&self) -> Option<u32> {
        match self.max_upload_attempts {
            0 => None,
            n => Some(n),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_file_bytes() -> u64 {
    DEFAULT_MAX_FILE_BYTES
}

fn default_max_upload_attempts() -> u32 {
    DEFAULT_MAX_UPLOAD_ATTEMPTS
}

fn default_allow_pdf() -> bool {
    true
}

/// Compiled defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub api_base_url: String,
    pub data_folder: PathBuf,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            data_folder: default_data_folder(),
            log_level: default_log_level(),
        }
    }
}

/// OS-dependent default data folder
fn default_data_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("festreg"))
        .unwrap_or_else(|| PathBuf::from("./festreg_data"))
}

/// Default location of `config.toml` (`~/.config/festreg/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("festreg").join("config.toml"))
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub api_url: Option<String>,
    pub token: Option<String>,
    pub data_folder: Option<PathBuf>,
    /// Explicit config file; must exist when given
    pub config_path: Option<PathBuf>,
}

/// Fully resolved client configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Backend base URL without trailing slash
    pub api_base_url: String,
    pub auth_token: Option<String>,
    pub data_folder: PathBuf,
    pub log_level: String,
    pub uploads: UploadConfig,
}

impl ClientConfig {
    /// Path of the SQLite session database
    pub fn database_path(&self) -> PathBuf {
        self.data_folder.join(DATABASE_FILE)
    }

    /// Create the data folder if missing
    pub fn ensure_data_folder(&self) -> Result<()> {
        if !self.data_folder.exists() {
            std::fs::create_dir_all(&self.data_folder)?;
            info!("Created data folder: {}", self.data_folder.display());
        }
        Ok(())
    }
}

/// Resolves [`ClientConfig`] from CLI, environment, TOML and defaults
pub struct ConfigResolver {
    overrides: CliOverrides,
}

impl ConfigResolver {
    pub fn new(overrides: CliOverrides) -> Self {
        Self { overrides }
    }

    /// Load the TOML layer
    fn toml_layer(&self) -> Result<TomlConfig> {
        if let Some(path) = &self.overrides.config_path {
            return load_toml_config(path);
        }

        match default_config_path() {
            Some(path) if path.exists() => match load_toml_config(&path) {
                Ok(config) => {
                    info!("Loaded config file: {}", path.display());
                    Ok(config)
                }
                Err(e) => {
                    warn!("{} (using defaults)", e);
                    Ok(TomlConfig::default())
                }
            },
            _ => {
                info!("No config file found, using defaults");
                Ok(TomlConfig::default())
            }
        }
    }

    /// Resolve every setting by priority
    pub fn resolve(&self) -> Result<ClientConfig> {
        let toml_config = self.toml_layer()?;
        let defaults = CompiledDefaults::for_current_platform();

        let api_base_url = self
            .overrides
            .api_url
            .clone()
            .or_else(|| env_value(ENV_API_URL))
            .or(toml_config.api_base_url)
            .unwrap_or(defaults.api_base_url);
        let api_base_url = normalize_base_url(&api_base_url)?;

        let auth_token = self
            .overrides
            .token
            .clone()
            .or_else(|| env_value(ENV_TOKEN))
            .or(toml_config.auth_token)
            .filter(|t| !t.trim().is_empty());

        let data_folder = self
            .overrides
            .data_folder
            .clone()
            .or_else(|| env_value(ENV_DATA_FOLDER).map(PathBuf::from))
            .or(toml_config.data_folder)
            .unwrap_or(defaults.data_folder);

        Ok(ClientConfig {
            api_base_url,
            auth_token,
            data_folder,
            log_level: toml_config.logging.level,
            uploads: toml_config.uploads,
        })
    }
}

/// Non-empty environment variable
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Require an http(s) URL and strip trailing slashes
fn normalize_base_url(url: &str) -> Result<String> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(Error::Config(format!(
            "API URL must start with http:// or https:// (got '{}')",
            url
        )));
    }
    Ok(url.trim_end_matches('/').to_string())
}
