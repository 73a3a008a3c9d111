//! CC-NEWS ingestion pipeline
//!
//! Lists a month of Common Crawl news archives, downloads them with bounded
//! concurrency, streams WARC response records out of each, strips boilerplate
//! from the HTML and writes a compacted `.wrc.gz` corpus per archive. Finished
//! archives are recorded in a ledger so interrupted runs resume where they
//! stopped.

pub mod config;
pub mod corpus;
pub mod download;
pub mod filter;
pub mod ledger;
pub mod listing;
pub mod runner;
pub mod state;
pub mod stats;
pub mod warc;
pub mod worker;

pub use config::{Config, Selectors};
pub use corpus::{
    CleanedDocument, CorpusEntry, CorpusFormatError, CorpusReader, CorpusSink, CorpusWriter,
    open_corpus,
};
pub use download::DownloadScheduler;
pub use filter::{ContentFilter, FilterError, split_http_body, text_preview};
pub use ledger::{CompletionLedger, LEDGER_FILE};
pub use listing::list_month;
pub use runner::{run, run_month};
pub use state::{ArchiveName, CrawlMonth, DownloadTask};
pub use stats::{ArchiveFailure, ArchiveStats, RunStats, RunSummary};
pub use warc::{StreamEnd, WarcReader, WarcRecord};
pub use worker::{ArchiveContext, ArchiveReport, process_archive};
