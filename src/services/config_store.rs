// Configuration Storage Service
// Handles config file read/write, version backup and environment overrides.
// This is the only place that reads provider credentials from the environment.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::providers::{
    HUGGINGFACE_DEFAULT_URL, OPENROUTER_DEFAULT_MODEL, OPENROUTER_DEFAULT_URL,
    SIGHTENGINE_DEFAULT_URL,
};

const CONFIG_VERSION: &str = "1.0.0";
const BACKUPS_KEPT: usize = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no platform config directory available")]
    NoConfigDir,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub sightengine: SightengineConfig,
    #[serde(default)]
    pub huggingface: HuggingFaceConfig,
    #[serde(default)]
    pub openrouter: OpenRouterConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            sightengine: SightengineConfig::default(),
            huggingface: HuggingFaceConfig::default(),
            openrouter: OpenRouterConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SightengineConfig {
    pub api_user: String,
    pub api_secret: String,
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for SightengineConfig {
    fn default() -> Self {
        Self {
            api_user: String::new(),
            api_secret: String::new(),
            url: SIGHTENGINE_DEFAULT_URL.to_string(),
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HuggingFaceConfig {
    pub api_key: String,
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for HuggingFaceConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            url: HUGGINGFACE_DEFAULT_URL.to_string(),
            timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OpenRouterConfig {
    pub api_key: String,
    pub url: String,
    pub model: String,
    /// Sent as `HTTP-Referer`, which OpenRouter requires
    pub referer: String,
    /// Sent as `X-Title`
    pub title: String,
    pub timeout_secs: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            url: OPENROUTER_DEFAULT_URL.to_string(),
            model: OPENROUTER_DEFAULT_MODEL.to_string(),
            referer: "http://localhost:5000".to_string(),
            title: "OmniDetect AI".to_string(),
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HistoryConfig {
    /// JSON-lines history file; defaults to the platform data dir
    pub path: Option<PathBuf>,
}

impl HistoryConfig {
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(p) = &self.path {
            return p.clone();
        }
        dirs::data_local_dir()
            .map(|d| d.join("omnidetect"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("history.jsonl")
    }
}

fn default_version() -> String {
    CONFIG_VERSION.to_string()
}

fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        return String::new();
    }
    let visible: String = secret.chars().take(4).collect();
    format!("{}****", visible)
}

impl AppConfig {
    /// Overlay credentials from the environment. Non-empty variables win over the file.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = read("SIGHTENGINE_API_USER") {
            self.sightengine.api_user = v;
        }
        if let Some(v) = read("SIGHTENGINE_API_SECRET") {
            self.sightengine.api_secret = v;
        }
        if let Some(v) = read("HUGGINGFACE_API_KEY") {
            self.huggingface.api_key = v;
        }
        if let Some(v) = read("OPENROUTER_API_KEY") {
            self.openrouter.api_key = v;
        }
        if let Some(v) = read("OMNIDETECT_HISTORY_PATH") {
            self.history.path = Some(PathBuf::from(v));
        }
    }

    /// Copy safe to print: secrets keep their first four characters
    pub fn masked(&self) -> Self {
        let mut copy = self.clone();
        copy.sightengine.api_secret = mask_secret(&self.sightengine.api_secret);
        copy.huggingface.api_key = mask_secret(&self.huggingface.api_key);
        copy.openrouter.api_key = mask_secret(&self.openrouter.api_key);
        copy
    }
}

pub struct ConfigStore {
    config_dir: PathBuf,
    config_file: PathBuf,
}

impl ConfigStore {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_file = config_dir.join("config.json");
        Self { config_dir, config_file }
    }

    /// Store backed by an explicit file; backups go next to it
    pub fn with_file(config_file: PathBuf) -> Self {
        let config_dir = config_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self { config_dir, config_file }
    }

    /// Get default config directory
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("omnidetect"))
    }

    pub fn open_default() -> Result<Self, ConfigError> {
        Self::default_config_dir()
            .map(Self::new)
            .ok_or(ConfigError::NoConfigDir)
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Load configuration from file; a missing file yields defaults
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        if !self.config_file.exists() {
            return Ok(AppConfig::default());
        }
        let content = fs::read_to_string(&self.config_file)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// File configuration with environment overrides applied
    pub fn load_effective(&self) -> Result<AppConfig, ConfigError> {
        let mut config = self.load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Save configuration to file, backing up the previous version
    pub fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.config_dir)?;

        if self.config_file.exists() {
            self.create_backup()?;
        }

        let content = serde_json::to_string_pretty(config)?;
        fs::write(&self.config_file, content)?;
        Ok(())
    }

    fn create_backup(&self) -> Result<(), ConfigError> {
        let backup_dir = self.config_dir.join("backups");
        fs::create_dir_all(&backup_dir)?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S%3f");
        let backup_file = backup_dir.join(format!("config_{}.json", timestamp));
        fs::copy(&self.config_file, &backup_file)?;

        self.cleanup_old_backups(&backup_dir, BACKUPS_KEPT)
    }

    /// Remove old backups, keeping only the most recent N
    fn cleanup_old_backups(&self, backup_dir: &Path, keep: usize) -> Result<(), ConfigError> {
        let mut entries: Vec<_> = fs::read_dir(backup_dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |ext| ext == "json"))
            .collect();

        if entries.len() <= keep {
            return Ok(());
        }

        // File names carry the timestamp, so lexical order is age order
        entries.sort_by_key(|e| e.file_name());

        for entry in entries.iter().take(entries.len() - keep) {
            let _ = fs::remove_file(entry.path());
        }

        Ok(())
    }
}
