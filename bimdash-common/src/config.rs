//! Bootstrap configuration
//!
//! Settings come from, in priority order:
//!
//! 1. Command-line arguments (`--root-folder`, `--config`, `--port`)
//! 2. Environment variables (`BIMDASH_ROOT_FOLDER`, `BIMDASH_CONFIG`,
//!    `BIMDASH_AI_API_KEY`)
//! 3. TOML config file (`~/.config/bimdash/config.toml`, then
//!    `/etc/bimdash/config.toml`)
//! 4. Compiled defaults
//!
//! A missing config file is not an error: the service starts on defaults.
//! A config file that exists but does not parse, or whose `[fields]` table
//! is invalid, is.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::fields::FieldRoles;
use crate::{Error, Result};

pub const APP_DIR: &str = "bimdash";
pub const ROOT_FOLDER_ENV: &str = "BIMDASH_ROOT_FOLDER";
pub const CONFIG_ENV: &str = "BIMDASH_CONFIG";
pub const AI_API_KEY_ENV: &str = "BIMDASH_AI_API_KEY";

/// HTTP port when neither CLI nor TOML set one
pub const DEFAULT_PORT: u16 = 5790;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Folder holding the SQLite database
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Role to column-name mapping
    #[serde(default)]
    pub fields: FieldRoles,

    #[serde(default)]
    pub ai: AiConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            port: DEFAULT_PORT,
            logging: LoggingConfig::default(),
            fields: FieldRoles::default(),
            ai: AiConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins when set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// OpenAI-compatible chat completions endpoint used by the column
/// classifier and the report generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_ai_base_url")]
    pub base_url: String,

    #[serde(default = "default_ai_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_ai_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_ai_temperature")]
    pub temperature: f32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: default_ai_base_url(),
            model: default_ai_model(),
            api_key: None,
            timeout_secs: default_ai_timeout_secs(),
            temperature: default_ai_temperature(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_ai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_ai_timeout_secs() -> u64 {
    120
}

fn default_ai_temperature() -> f32 {
    0.2
}

/// Pick the config file to read.
///
/// An explicit path (CLI, then `BIMDASH_CONFIG`) is returned as given so a
/// typo surfaces as an error when loading. The standard locations are only
/// returned when the file exists.
pub fn locate_config_file(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let user_config = dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc").join(APP_DIR).join("config.toml");
    if cfg!(unix) && system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Read and validate one TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    config.fields.validate()?;
    Ok(config)
}

/// Locate and load the config, falling back to defaults when no file exists.
///
/// Returns the config and the file it came from; `None` means compiled
/// defaults. Runs before logging is set up, so the caller reports the source.
pub fn load_config(cli_arg: Option<&Path>) -> Result<(TomlConfig, Option<PathBuf>)> {
    match locate_config_file(cli_arg) {
        Some(path) => {
            let config = load_toml_config(&path)?;
            Ok((config, Some(path)))
        }
        None => Ok((TomlConfig::default(), None)),
    }
}

/// Resolve the root folder: CLI, then environment, then TOML, then the
/// platform default
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Platform data directory for bimdash
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("/var/lib").join(APP_DIR))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support").join(APP_DIR))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData").join(APP_DIR))
    } else {
        PathBuf::from("./bimdash_data")
    }
}

/// Resolve the AI API key from the environment, then the TOML `[ai]` table.
///
/// `None` means the AI collaborators run unauthenticated; local
/// OpenAI-compatible servers accept that.
pub fn resolve_ai_api_key(toml_config: &TomlConfig) -> Option<String> {
    let env_key = std::env::var(AI_API_KEY_ENV).ok().filter(|k| is_valid_key(k));
    let toml_key = toml_config.ai.api_key.clone().filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!("AI API key found in environment and TOML config. Using environment.");
    }

    if let Some(key) = env_key {
        info!("AI API key loaded from environment variable");
        return Some(key);
    }

    if let Some(key) = toml_key {
        info!("AI API key loaded from TOML config");
        return Some(key);
    }

    warn!(
        "AI API key not configured (set {} or [ai] api_key); AI requests are sent without one",
        AI_API_KEY_ENV
    );
    None
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
