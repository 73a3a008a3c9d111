//! Identifiers shared by every stage: crawl month, archive names, download tasks

use std::fmt;
use std::path::{Path, PathBuf};

/// Suffix of source archives in the listing
pub const ARCHIVE_SUFFIX: &str = ".warc.gz";

/// Suffix of the compacted corpus written per archive
pub const CORPUS_SUFFIX: &str = ".wrc.gz";

/// One month of the CC-NEWS crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CrawlMonth {
    year: u16,
    month: u8,
}

impl CrawlMonth {
    /// `None` unless `month` is 1..=12
    pub fn new(year: u16, month: u8) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn year(&self) -> u16 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    /// Listing path relative to the source root
    pub fn listing_path(&self) -> String {
        format!(
            "crawl-data/CC-NEWS/{}/{:02}/warc.paths.gz",
            self.year, self.month
        )
    }

    /// Output directory for this month: `{data_dir}/{yyyy}/{mm}`
    pub fn output_dir(&self, data_dir: &Path) -> PathBuf {
        data_dir
            .join(format!("{:04}", self.year))
            .join(format!("{:02}", self.month))
    }
}

impl fmt::Display for CrawlMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Name of one archive, derived from its listing path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveName {
    file_name: String,
}

impl ArchiveName {
    /// Parse the last path segment; must end in `.warc.gz`
    pub fn from_remote_path(remote_path: &str) -> Option<Self> {
        let file_name = remote_path.rsplit('/').next()?;
        let stem = file_name.strip_suffix(ARCHIVE_SUFFIX)?;
        if stem.is_empty() {
            return None;
        }
        Some(Self {
            file_name: file_name.to_string(),
        })
    }

    /// Source archive file name, e.g. `CC-NEWS-20250301004532-00945.warc.gz`
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Output corpus file name; also the ledger key
    pub fn corpus_name(&self) -> String {
        let stem = self
            .file_name
            .strip_suffix(ARCHIVE_SUFFIX)
            .unwrap_or(&self.file_name);
        format!("{stem}{CORPUS_SUFFIX}")
    }
}

/// A downloaded archive waiting for a parse worker.
///
/// The local file is owned by the task and removed once parsing ends.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub remote_path: String,
    pub local_path: PathBuf,
    pub name: ArchiveName,
}

impl DownloadTask {
    /// Ledger key and output file name
    pub fn key(&self) -> String {
        self.name.corpus_name()
    }
}
