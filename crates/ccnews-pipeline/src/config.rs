//! Pipeline configuration

use std::path::PathBuf;

use ccnews_core::HttpConfig;
use serde::Deserialize;

/// Default archive root
pub const DEFAULT_BASE_URL: &str = "https://data.commoncrawl.org/";

/// Removal rules applied to every HTML document.
///
/// `class_keywords` entries are patterns: `^foo` matches classes starting with
/// `foo`, `foo$` classes ending with `foo`, anything else is a substring match.
/// All class and attribute comparisons are case-insensitive.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Selectors {
    pub tags: Vec<String>,
    pub classes: Vec<String>,
    pub class_keywords: Vec<String>,
    pub attributes: Vec<String>,
}

impl Selectors {
    /// No rules at all; only the fixed attribute prefixes are stripped
    pub fn empty() -> Self {
        Self {
            tags: Vec::new(),
            classes: Vec::new(),
            class_keywords: Vec::new(),
            attributes: Vec::new(),
        }
    }
}

impl Default for Selectors {
    /// Boilerplate commonly found around news articles
    fn default() -> Self {
        let owned = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect();
        Self {
            tags: owned(&[
                "script", "style", "noscript", "iframe", "svg", "link", "meta", "nav", "header",
                "footer", "aside", "form", "button",
            ]),
            classes: owned(&["advertisement", "share", "social", "related", "newsletter"]),
            class_keywords: owned(&["^ad-", "-ad$", "banner", "cookie", "sidebar", "promo"]),
            attributes: owned(&["style"]),
        }
    }
}

/// Runtime configuration for one crawl
#[derive(Debug, Clone)]
pub struct Config {
    /// Clean workers per archive; also sizes the document queues
    pub workers: usize,
    /// Archives downloaded concurrently ahead of parsing
    pub predownloads: usize,
    /// Archives parsed concurrently
    pub parse_workers: usize,
    /// Archive root: `http(s)://...` or a local mirror directory
    pub base_url: String,
    /// Scratch directory for listings and downloaded archives
    pub temp_dir: PathBuf,
    /// Root of the `{yyyy}/{mm}` output tree
    pub data_dir: PathBuf,
    pub selectors: Selectors,
    pub http: HttpConfig,
    /// Only consider the first N listed archives
    pub max_archives: Option<usize>,
}

impl Config {
    /// Builder-style override of the worker count; predownloads and parse
    /// workers follow unless set explicitly afterwards.
    pub fn with_workers(mut self, workers: usize) -> Self {
        let workers = workers.max(1);
        self.workers = workers;
        self.predownloads = default_predownloads(workers);
        self.parse_workers = self.predownloads;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        let predownloads = default_predownloads(workers);
        Self {
            workers,
            predownloads,
            parse_workers: predownloads,
            base_url: DEFAULT_BASE_URL.to_string(),
            temp_dir: PathBuf::from("./tmp"),
            data_dir: PathBuf::from("./data"),
            selectors: Selectors::default(),
            http: HttpConfig::default(),
            max_archives: None,
        }
    }
}

/// A quarter of the workers, at least one
pub fn default_predownloads(workers: usize) -> usize {
    (workers / 4).max(1)
}
