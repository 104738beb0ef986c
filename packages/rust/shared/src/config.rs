//! Application configuration for fitscout.
//!
//! User config lives at `~/.fitscout/fitscout.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{FitScoutError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "fitscout.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".fitscout";

/// Database file name inside the data directory.
const DB_FILE_NAME: &str = "fitscout.db";

// ---------------------------------------------------------------------------
// Config structs (matching fitscout.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Parts-lookup source settings.
    #[serde(default)]
    pub lookup: LookupSection,

    /// Session behaviour.
    #[serde(default)]
    pub session: SessionSection,

    /// Where checkpoints and history are kept.
    #[serde(default)]
    pub storage: StorageSection,
}

/// `[lookup]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupSection {
    /// Root of the parts-lookup site.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path of the part-search page; `{part}` is replaced by the part number.
    #[serde(default = "default_search_path")]
    pub search_path: String,

    /// Label recorded as the `source` of every match.
    #[serde(default = "default_source_name")]
    pub source_name: String,

    /// Pause after each page load, in milliseconds.
    #[serde(default = "default_request_delay")]
    pub request_delay_ms: u64,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// How many in-page part links to follow when the search page has no panel.
    #[serde(default = "default_max_followed_links")]
    pub max_followed_links: usize,

    /// Optional User-Agent override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Default for LookupSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            search_path: default_search_path(),
            source_name: default_source_name(),
            request_delay_ms: default_request_delay(),
            timeout_secs: default_timeout_secs(),
            max_followed_links: default_max_followed_links(),
            user_agent: None,
        }
    }
}

fn default_base_url() -> String {
    "https://www.rockauto.com".into()
}
fn default_search_path() -> String {
    "/en/partsearch/?partnum={part}".into()
}
fn default_source_name() -> String {
    "RockAuto".into()
}
fn default_request_delay() -> u64 {
    1500
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_followed_links() -> usize {
    3
}

/// `[session]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSection {
    /// Write a checkpoint every N processed records.
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,

    /// How many leaderboard entries progress events carry.
    #[serde(default = "default_leaderboard_size")]
    pub leaderboard_size: usize,

    /// Number of history summaries kept in memory.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Size of the range used by a test batch.
    #[serde(default = "default_test_batch_size")]
    pub test_batch_size: usize,

    /// Per-observer event buffer; a full buffer drops the observer.
    #[serde(default = "default_observer_buffer")]
    pub observer_buffer: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            checkpoint_interval: default_checkpoint_interval(),
            leaderboard_size: default_leaderboard_size(),
            history_limit: default_history_limit(),
            test_batch_size: default_test_batch_size(),
            observer_buffer: default_observer_buffer(),
        }
    }
}

fn default_checkpoint_interval() -> usize {
    10
}
fn default_leaderboard_size() -> usize {
    10
}
fn default_history_limit() -> usize {
    50
}
fn default_test_batch_size() -> usize {
    50
}
fn default_observer_buffer() -> usize {
    256
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSection {
    /// Data directory. Defaults to `~/.fitscout/data`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
}

impl AppConfig {
    /// Reject values that would make a run misbehave.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.lookup.base_url).map_err(|e| {
            FitScoutError::config(format!("invalid lookup.base_url '{}': {e}", self.lookup.base_url))
        })?;
        if !self.lookup.search_path.contains("{part}") {
            return Err(FitScoutError::config(
                "lookup.search_path must contain a {part} placeholder",
            ));
        }
        if self.session.checkpoint_interval == 0 {
            return Err(FitScoutError::config(
                "session.checkpoint_interval must be at least 1",
            ));
        }
        if self.session.observer_buffer == 0 {
            return Err(FitScoutError::config(
                "session.observer_buffer must be at least 1",
            ));
        }
        Ok(())
    }

    /// Resolve the path of the libSQL database file.
    pub fn db_path(&self) -> Result<PathBuf> {
        let dir = match &self.storage.data_dir {
            Some(dir) => PathBuf::from(dir),
            None => config_dir()?.join("data"),
        };
        Ok(dir.join(DB_FILE_NAME))
    }
}

// ---------------------------------------------------------------------------
// Runtime configs (derived from AppConfig)
// ---------------------------------------------------------------------------

/// Runtime lookup configuration handed to the page fetcher and extractor.
#[derive(Debug, Clone)]
pub struct LookupConfig {
    pub base_url: String,
    pub search_path: String,
    pub source_name: String,
    pub request_delay_ms: u64,
    pub timeout_secs: u64,
    pub max_followed_links: usize,
    pub user_agent: Option<String>,
}

impl From<&AppConfig> for LookupConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            base_url: config.lookup.base_url.clone(),
            search_path: config.lookup.search_path.clone(),
            source_name: config.lookup.source_name.clone(),
            request_delay_ms: config.lookup.request_delay_ms,
            timeout_secs: config.lookup.timeout_secs,
            max_followed_links: config.lookup.max_followed_links,
            user_agent: config.lookup.user_agent.clone(),
        }
    }
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

/// Runtime session configuration handed to the session manager.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub checkpoint_interval: usize,
    pub leaderboard_size: usize,
    pub history_limit: usize,
    pub test_batch_size: usize,
    pub observer_buffer: usize,
}

impl From<&AppConfig> for SessionConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            checkpoint_interval: config.session.checkpoint_interval.max(1),
            leaderboard_size: config.session.leaderboard_size,
            history_limit: config.session.history_limit,
            test_batch_size: config.session.test_batch_size,
            observer_buffer: config.session.observer_buffer.max(1),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.fitscout/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| FitScoutError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.fitscout/fitscout.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| FitScoutError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| FitScoutError::config(format!("failed to parse {}: {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| FitScoutError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| FitScoutError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| FitScoutError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("base_url"));
        assert!(toml_str.contains("checkpoint_interval = 10"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.lookup.request_delay_ms, 1500);
        assert_eq!(parsed.session.history_limit, 50);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[lookup]
base_url = "http://127.0.0.1:8080"
request_delay_ms = 0

[storage]
data_dir = "/tmp/fitscout-data"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.lookup.max_followed_links, 3);
        assert_eq!(config.session.checkpoint_interval, 10);
        assert_eq!(
            config.db_path().expect("db path"),
            PathBuf::from("/tmp/fitscout-data/fitscout.db")
        );
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.lookup.base_url = "not a url".into();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.lookup.search_path = "/search".into();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.session.checkpoint_interval = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn runtime_configs_from_app_config() {
        let app = AppConfig::default();
        let lookup = LookupConfig::from(&app);
        assert_eq!(lookup.source_name, "RockAuto");
        assert_eq!(lookup.timeout_secs, 30);

        let session = SessionConfig::from(&app);
        assert_eq!(session.checkpoint_interval, 10);
        assert_eq!(session.leaderboard_size, 10);
        assert_eq!(session.test_batch_size, 50);
    }
}
