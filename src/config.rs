//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILSIFT_CONFIG` (environment variable)
//! 2. `~/.config/mailsift/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailsift\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Query defaults.
    pub search: SearchConfig,
    /// Relevance weights for message ranking.
    pub ranking: RankingConfig,
    /// Cold-start snapshot settings.
    pub persistence: PersistenceConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for snapshots and logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Query defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum number of messages returned when the caller gives no limit.
    pub default_limit: usize,
    /// Maximum number of contacts returned by contact queries.
    pub contact_limit: usize,
    /// Keystroke quiescence before an interactive caller fires a query.
    pub debounce_ms: u64,
}

/// Relevance weights. None of these are a compatibility contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Multiplier for hits in the subject.
    pub subject_weight: f64,
    /// Multiplier for hits in the body snippet.
    pub body_weight: f64,
    /// Multiplier applied to verified phrase occurrences.
    pub phrase_weight: f64,
    /// Fraction of credit for a token that only contains the query term.
    pub partial_match_factor: f64,
    /// Flat credit for each satisfied `from:`/`to:`/`subject:` filter.
    pub field_match_weight: f64,
    /// Upper bound of the recency boost. Held below the gap between an exact
    /// and a partial body hit.
    pub recency_max_boost: f64,
    /// Age (days) at which the recency boost has halved.
    pub recency_half_life_days: f64,
}

/// Cold-start snapshot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Write a binary snapshot after building the index from a feed.
    pub snapshot_enabled: bool,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            contact_limit: 10,
            debounce_ms: 150,
        }
    }
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            subject_weight: 3.0,
            body_weight: 1.0,
            phrase_weight: 2.0,
            partial_match_factor: 0.5,
            field_match_weight: 0.5,
            recency_max_boost: 0.4,
            recency_half_life_days: 30.0,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            snapshot_enabled: true,
        }
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration from `$MAILSIFT_CONFIG` or the platform config dir.
///
/// A missing file yields the defaults. So does an unreadable or malformed
/// one, after a warning.
pub fn load_config() -> Config {
    let Some(path) = config_file_path() else {
        return Config::default();
    };
    if !path.exists() {
        return Config::default();
    }
    match load_config_from(&path) {
        Ok(cfg) => {
            tracing::info!(path = %path.display(), "Loaded config");
            cfg
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring config file");
            Config::default()
        }
    }
}

/// Parse one config file. Absent keys take their default values.
pub fn load_config_from(path: &Path) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
}

/// Save configuration to the standard location.
pub fn save_config(config: &Config) -> anyhow::Result<()> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(&path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILSIFT_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("mailsift").join("config.toml"))
}

/// Return the cache directory for snapshots, logs, etc.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailsift")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("mailsift.log")
}
