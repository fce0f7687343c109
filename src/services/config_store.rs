// Configuration Storage Service
// Handles config file read/write, version backup and environment overrides

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use super::moderation::terms::TermTables;

pub const DEFAULT_MODEL_ID: &str = "google/gemma-3-12b-it";
pub const DEFAULT_JUDGE_URL: &str = "https://router.huggingface.co/v1/chat/completions";
pub const DEFAULT_MAX_TOKENS: u32 = 256;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

const MAX_TOKENS_LIMIT: u32 = 1024;
const TIMEOUT_SECS_LIMIT: u64 = 300;
const BACKUPS_KEPT: usize = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to access config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub judge: JudgeConfig,
    #[serde(default)]
    pub terms: TermTables,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            judge: JudgeConfig::default(),
            terms: TermTables::default(),
            server: ServerConfig::default(),
            api_keys: HashMap::new(),
        }
    }
}

/// Settings for the LLM judge backend. Temperature is fixed at 0 and not configurable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeConfig {
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default = "default_judge_url")]
    pub base_url: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Resolved at startup from env or `apiKeys.hf`; never written back to disk.
    #[serde(skip)]
    pub api_token: Option<String>,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            base_url: default_judge_url(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            api_token: None,
        }
    }
}

impl JudgeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Clamp token and timeout budgets into their allowed ranges.
    pub fn bounded(mut self) -> Self {
        let max_tokens = self.max_tokens.clamp(1, MAX_TOKENS_LIMIT);
        if max_tokens != self.max_tokens {
            warn!(requested = self.max_tokens, applied = max_tokens, "judge max_tokens out of range");
            self.max_tokens = max_tokens;
        }
        let timeout_secs = self.timeout_secs.clamp(1, TIMEOUT_SECS_LIMIT);
        if timeout_secs != self.timeout_secs {
            warn!(requested = self.timeout_secs, applied = timeout_secs, "judge timeout out of range");
            self.timeout_secs = timeout_secs;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_app_name")]
    pub app_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            app_name: default_app_name(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_version() -> String { "1.0.0".to_string() }
fn default_model_id() -> String { DEFAULT_MODEL_ID.to_string() }
fn default_judge_url() -> String { DEFAULT_JUDGE_URL.to_string() }
fn default_max_tokens() -> u32 { DEFAULT_MAX_TOKENS }
fn default_timeout_secs() -> u64 { DEFAULT_TIMEOUT_SECS }
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_app_name() -> String { "review-agent".to_string() }

impl AppConfig {
    /// Apply environment overrides and bounds. Called once at process start.
    pub fn resolve(mut self) -> Self {
        if let Some(model) = env_value("REVIEW_MODEL_ID") {
            self.judge.model_id = model;
        }
        if let Some(url) = env_value("REVIEW_GUARD_JUDGE_URL") {
            self.judge.base_url = url;
        }
        if let Some(secs) = env_value("REVIEW_GUARD_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.judge.timeout_secs = secs;
        }
        if let Some(tokens) = env_value("REVIEW_GUARD_MAX_TOKENS").and_then(|v| v.parse().ok()) {
            self.judge.max_tokens = tokens;
        }
        if let Some(port) = env_value("PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Some(name) = env_value("APP_NAME") {
            self.server.app_name = name;
        }

        self.judge.api_token = env_value("HF_TOKEN")
            .or_else(|| env_value("REVIEW_GUARD_HF_TOKEN"))
            .or_else(|| {
                self.api_keys
                    .get("hf")
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
            });
        self.judge = self.judge.bounded();
        self
    }
}

fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
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

    /// Get default config directory
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("reviewGuard"))
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Load configuration from file; a missing file yields defaults.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        if !self.config_file.exists() {
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&self.config_file)
            .map_err(|e| ConfigError::io(&self.config_file, e))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to file, backing up the previous version.
    pub fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.config_dir).map_err(|e| ConfigError::io(&self.config_dir, e))?;

        if self.config_file.exists() {
            self.create_backup()?;
        }

        let content = serde_json::to_string_pretty(config)?;
        fs::write(&self.config_file, content).map_err(|e| ConfigError::io(&self.config_file, e))
    }

    fn create_backup(&self) -> Result<(), ConfigError> {
        let backup_dir = self.config_dir.join("backups");
        fs::create_dir_all(&backup_dir).map_err(|e| ConfigError::io(&backup_dir, e))?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S%3f");
        let backup_file = backup_dir.join(format!("config_{}.json", timestamp));

        fs::copy(&self.config_file, &backup_file).map_err(|e| ConfigError::io(&backup_file, e))?;

        self.cleanup_old_backups(&backup_dir, BACKUPS_KEPT)
    }

    fn cleanup_old_backups(&self, backup_dir: &Path, keep: usize) -> Result<(), ConfigError> {
        let mut entries: Vec<_> = fs::read_dir(backup_dir)
            .map_err(|e| ConfigError::io(backup_dir, e))?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |ext| ext == "json"))
            .collect();

        if entries.len() <= keep {
            return Ok(());
        }

        // Timestamped names sort oldest first
        entries.sort_by_key(|e| e.file_name());

        for entry in entries.iter().take(entries.len() - keep) {
            let _ = fs::remove_file(entry.path());
        }

        Ok(())
    }
}

/// Load the config from the default location (or defaults) and resolve overrides.
pub fn load_app_config() -> AppConfig {
    let loaded = ConfigStore::default_config_dir()
        .map(ConfigStore::new)
        .map(|store| store.load());

    let config = match loaded {
        Some(Ok(config)) => config,
        Some(Err(e)) => {
            warn!(error = %e, "config file unreadable, using defaults");
            AppConfig::default()
        }
        None => AppConfig::default(),
    };
    config.resolve()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.judge.model_id, DEFAULT_MODEL_ID);
        assert_eq!(config.judge.max_tokens, 256);
        assert_eq!(config.judge.timeout(), Duration::from_secs(120));
        assert_eq!(config.server.bind_addr(), "0.0.0.0:8080");
        assert!(!config.terms.promo.is_empty());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let json = r#"{"judge": {"modelId": "Qwen/Qwen3-8B"}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.judge.model_id, "Qwen/Qwen3-8B");
        assert_eq!(config.judge.base_url, DEFAULT_JUDGE_URL);
        assert_eq!(config.server.app_name, "review-agent");
        assert!(config.terms.visit_markers.contains(&"waited".to_string()));
    }

    #[test]
    fn test_judge_bounds() {
        let judge = JudgeConfig {
            max_tokens: 100_000,
            timeout_secs: 0,
            ..JudgeConfig::default()
        }
        .bounded();
        assert_eq!(judge.max_tokens, MAX_TOKENS_LIMIT);
        assert_eq!(judge.timeout_secs, 1);
    }

    #[test]
    fn test_api_token_not_serialized() {
        let mut config = AppConfig::default();
        config.judge.api_token = Some("secret".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_store_roundtrip_and_backup() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("reviewGuard"));

        let loaded = store.load().unwrap();
        assert_eq!(loaded.judge, JudgeConfig::default());

        let mut config = AppConfig::default();
        config.judge.timeout_secs = 30;
        store.save(&config).unwrap();
        config.judge.timeout_secs = 45;
        store.save(&config).unwrap();

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.judge.timeout_secs, 45);

        let backups = fs::read_dir(dir.path().join("reviewGuard").join("backups"))
            .unwrap()
            .count();
        assert_eq!(backups, 1);
    }

    #[test]
    fn test_corrupt_config_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.json"), "{not json").unwrap();
        let store = ConfigStore::new(dir.path().to_path_buf());
        assert!(matches!(store.load(), Err(ConfigError::Parse(_))));
    }
}
