//! Bootstrap configuration loading and config file resolution
//!
//! The TOML file only seeds the engine's initial settings. Values are kept
//! as raw numbers here; range checks and fallbacks belong to the engine so
//! that a config value behaves exactly like the same value typed at runtime.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "METRONOME_CONFIG";

/// Default debounce window for interactive tempo/signature edits
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Initial engine settings
    #[serde(default)]
    pub metronome: MetronomeConfig,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Initial metronome settings
///
/// Every field is optional; `None` means "use the engine default".
#[derive(Debug, Clone, Deserialize)]
pub struct MetronomeConfig {
    /// Tempo in beats per minute
    #[serde(default)]
    pub tempo: Option<f64>,

    /// Beats per measure
    #[serde(default)]
    pub beats_per_measure: Option<f64>,

    /// Volume level (0.0 to 1.0)
    #[serde(default)]
    pub volume: Option<f64>,

    /// Cue source identifiers: [downbeat, upbeat]
    #[serde(default)]
    pub cue_sources: Vec<String>,

    /// Quiet period before an interactive tempo/signature edit is applied
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            tempo: None,
            beats_per_measure: None,
            volume: None,
            cue_sources: Vec::new(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
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

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Load configuration from a file
    ///
    /// A missing or unreadable file is an `Error::Io`; malformed content is
    /// an `Error::Config`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid TOML in {}: {}", path.display(), e)))
    }

    /// Load configuration, falling back to defaults when no file exists
    ///
    /// Missing config is not fatal: a warning is logged and built-in
    /// defaults are used. A file that exists but fails to parse is an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            debug!("No config file location available, using defaults");
            return Ok(Self::default());
        };

        if !path.exists() {
            warn!("Config file not found: {}, using defaults", path.display());
            return Ok(Self::default());
        }

        debug!("Loading config from {}", path.display());
        Self::load(path)
    }
}

/// Config file resolution in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. OS-dependent default location (`<config_dir>/metronome/config.toml`)
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: OS-dependent default
    default_config_path()
}

/// Get the default configuration file path for the platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("metronome").join("config.toml"))
}
