use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result, anyhow};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Environment variable that overrides `base_url` from the config file
pub const BACKEND_URL_ENV: &str = "DOCQA_BACKEND_URL";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub max_upload_bytes: u64,
    pub probe_interval_secs: u64,
    pub probe_timeout_secs: u64,
    pub ask_timeout_secs: u64,
    /// Questions stay disabled until a document upload is confirmed
    pub require_upload: bool,
    /// Questions stay disabled while the last probe failed
    pub block_when_disconnected: bool,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            max_upload_bytes: MAX_UPLOAD_BYTES,
            probe_interval_secs: 5,
            probe_timeout_secs: 3,
            ask_timeout_secs: 120,
            require_upload: true,
            block_when_disconnected: true,
            log_filter: "info".to_string(),
        }
    }

    /// A missing file means defaults; an unreadable or invalid one is an error
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("could not read config file {}", config_path.display()))?;
        Self::from_json(&config_content)
            .with_context(|| format!("invalid config file {}", config_path.display()))
    }

    /// Load from disk, then apply the environment and an optional CLI override
    pub fn resolve(url_override: Option<&str>) -> Result<Self> {
        Self::resolve_from(&Self::path()?, url_override)
    }

    pub fn resolve_from(config_path: &Path, url_override: Option<&str>) -> Result<Self> {
        let mut config = Self::load_from(config_path)?;
        if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
            config.base_url = url;
        }
        if let Some(url) = url_override {
            config.base_url = url.to_string();
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, config_content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(anyhow!("base_url must start with http:// or https://, got {:?}", self.base_url));
        }
        if self.probe_interval_secs == 0 {
            return Err(anyhow!("probe_interval_secs must be at least 1"));
        }
        if self.max_upload_bytes == 0 {
            return Err(anyhow!("max_upload_bytes must be positive"));
        }
        Ok(())
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }

    pub fn ask_timeout(&self) -> Option<Duration> {
        (self.ask_timeout_secs > 0).then(|| Duration::from_secs(self.ask_timeout_secs))
    }

    pub fn path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("docqa").join("config.json"))
    }

    pub fn log_path() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .or_else(dirs::config_dir)
            .ok_or_else(|| anyhow!("Could not determine data directory"))?;

        Ok(data_dir.join("docqa").join("docqa.log"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_backend_contract() {
        let config = Config::new();
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert!(config.require_upload);
        assert_eq!(config.ask_timeout(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = Config::from_json(r#"{ "base_url": "http://10.0.0.2:9000", "require_upload": false }"#).unwrap();
        assert_eq!(config.base_url, "http://10.0.0.2:9000");
        assert!(!config.require_upload);
        assert_eq!(config.probe_interval_secs, 5);
    }

    #[test]
    fn test_zero_ask_timeout_disables_bound() {
        let config = Config::from_json(r#"{ "ask_timeout_secs": 0 }"#).unwrap();
        assert_eq!(config.ask_timeout(), None);
    }

    #[test]
    fn test_rejects_non_http_url() {
        assert!(Config::from_json(r#"{ "base_url": "localhost:8000" }"#).is_err());
    }

    #[test]
    fn test_rejects_zero_probe_interval() {
        assert!(Config::from_json(r#"{ "probe_interval_secs": 0 }"#).is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::new());
    }

    #[test]
    fn test_invalid_file_is_reported_not_defaulted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "probe_interval_secs": 0 }"#).unwrap();

        let err = Config::resolve_from(&path, Some("http://10.0.0.5:8000")).unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("invalid config file"), "{}", message);
        assert!(message.contains(&path.display().to_string()));
        assert!(message.contains("probe_interval_secs must be at least 1"));
    }

    #[test]
    fn test_unparsable_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ base_url = ").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_cli_url_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "base_url": "http://files:8000", "ask_timeout_secs": 30 }"#).unwrap();

        let config = Config::resolve_from(&path, Some("http://cli:9000")).unwrap();
        assert_eq!(config.base_url, "http://cli:9000");
        assert_eq!(config.ask_timeout_secs, 30);
    }
}
