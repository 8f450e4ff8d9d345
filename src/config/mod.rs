use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3678";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub media: MediaConfig,
}

/// Where the playback daemon lives and how long we wait for it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_ms: 3000,
        }
    }
}

impl DaemonConfig {
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { interval_ms: 2000 }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// MPRIS bus name suffix (`org.mpris.MediaPlayer2.<identity>`).
    pub identity: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            identity: "nowplaying_bridge".to_string(),
        }
    }
}

impl Config {
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nowplaying-bridge")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config from {}", config_path.display()))?;
            let config: Config =
                toml::from_str(&content).with_context(|| "Failed to parse config file")?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        if let Some(url) = base_url {
            self.daemon.base_url = url;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.toml")).unwrap();

        assert_eq!(config.daemon.base_url(), DEFAULT_BASE_URL);
        assert_eq!(config.daemon.request_timeout(), Duration::from_secs(3));
        assert_eq!(config.poll.interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[daemon]\nbase_url = \"http://pi.local:3678/\"").unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.daemon.base_url(), "http://pi.local:3678");
        assert_eq!(config.daemon.request_timeout_ms, 3000);
        assert_eq!(config.media.identity, "nowplaying_bridge");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[poll]\ninterval_ms = \"soon\"").unwrap();

        assert!(Config::load_from(file.path()).is_err());
    }

    #[test]
    fn test_base_url_override() {
        let config = Config::default().with_base_url(Some("http://other:1".to_string()));
        assert_eq!(config.daemon.base_url(), "http://other:1");

        let config = Config::default().with_base_url(None);
        assert_eq!(config.daemon.base_url(), DEFAULT_BASE_URL);
    }
}
