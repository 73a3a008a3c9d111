//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use ccnews_core::HttpConfig;
use ccnews_pipeline::Selectors;
use ccnews_pipeline::config::{DEFAULT_BASE_URL, default_predownloads};
use serde::Deserialize;

/// Global configuration for ccnews
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub crawl: CrawlConfig,
    pub selectors: Selectors,
    pub http: HttpSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub workers: usize,
    /// Defaults to a quarter of `workers`
    pub predownloads: Option<usize>,
    /// Defaults to `predownloads`
    pub parse_workers: Option<usize>,
    pub base_url: String,
    pub temp_dir: PathBuf,
    pub data_dir: PathBuf,
    pub max_archives: Option<usize>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            workers: cpus,
            predownloads: None,
            parse_workers: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            temp_dir: PathBuf::from("./tmp"),
            data_dir: PathBuf::from("./data"),
            max_archives: None,
        }
    }
}

/// Timeouts in seconds
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub connect_timeout: u64,
    pub read_timeout: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        let http = HttpConfig::default();
        Self {
            connect_timeout: http.connect_timeout.as_secs(),
            read_timeout: http.read_timeout.as_secs(),
        }
    }
}

impl From<HttpSettings> for HttpConfig {
    fn from(s: HttpSettings) -> Self {
        Self {
            connect_timeout: Duration::from_secs(s.connect_timeout),
            read_timeout: Duration::from_secs(s.read_timeout),
        }
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./ccnews.toml (current directory)
    /// 2. ~/.config/ccnews/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("ccnews.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "ccnews") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Pipeline configuration with file values filled in
    pub fn pipeline(&self) -> ccnews_pipeline::Config {
        let workers = self.crawl.workers.max(1);
        let predownloads = self
            .crawl
            .predownloads
            .unwrap_or_else(|| default_predownloads(workers))
            .max(1);
        ccnews_pipeline::Config {
            workers,
            predownloads,
            parse_workers: self.crawl.parse_workers.unwrap_or(predownloads).max(1),
            base_url: self.crawl.base_url.clone(),
            temp_dir: self.crawl.temp_dir.clone(),
            data_dir: self.crawl.data_dir.clone(),
            selectors: self.selectors.clone(),
            http: self.http.into(),
            max_archives: self.crawl.max_archives,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.crawl.data_dir, PathBuf::from("./data"));
        assert_eq!(config.crawl.base_url, DEFAULT_BASE_URL);
        assert!(config.crawl.workers >= 1);
        assert_eq!(config.http.read_timeout, 60);
    }

    #[test]
    fn parse_config_toml() {
        let toml = r#"
[crawl]
workers = 8
data_dir = "/srv/news"

[selectors]
tags = ["script", "nav"]
class_keywords = ["^ad-"]

[http]
read_timeout = 120
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.crawl.workers, 8);
        assert_eq!(config.crawl.data_dir, PathBuf::from("/srv/news"));
        assert_eq!(config.selectors.tags, vec!["script", "nav"]);
        assert_eq!(config.selectors.class_keywords, vec!["^ad-"]);
        // Unset selector lists keep their defaults
        assert_eq!(config.selectors.attributes, Selectors::default().attributes);
        assert_eq!(config.http.read_timeout, 120);
        assert_eq!(config.http.connect_timeout, 30);
    }

    #[test]
    fn pipeline_derives_concurrency() {
        let mut config = Config::default();
        config.crawl.workers = 8;
        let p = config.pipeline();
        assert_eq!(p.predownloads, 2);
        assert_eq!(p.parse_workers, 2);
        assert_eq!(p.http.read_timeout, Duration::from_secs(60));

        config.crawl.predownloads = Some(5);
        config.crawl.parse_workers = Some(0);
        let p = config.pipeline();
        assert_eq!(p.predownloads, 5);
        assert_eq!(p.parse_workers, 1);
    }

    #[test]
    fn from_file_reports_parse_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ccnews.toml");
        std::fs::write(&path, "[crawl]\nworkers = \"many\"\n").unwrap();
        let err = Config::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }
}
