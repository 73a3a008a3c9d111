//! ccnews core - shared infrastructure for the news ingestion pipeline
//!
//! HTTP and mirror sources, gzip readers, bounded worker queues, shutdown
//! signalling, logging and progress bars. Nothing in here knows about WARC
//! or HTML; that lives in `ccnews-pipeline`.

pub mod error;
pub mod logging;
pub mod progress;
pub mod semaphore;
pub mod shutdown;
pub mod sink;
pub mod source;
pub mod stream;
pub mod work_queue;

// Re-exports for convenience
pub use error::ArchiveError;
pub use logging::{IndicatifLogger, init_logging};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use semaphore::{Permit, Semaphore};
pub use shutdown::ShutdownSignal;
pub use sink::{ErrorFlag, cleanup_tmp_files, remove_quietly, tmp_path_for};
pub use source::{ArchiveSource, HttpSource, MirrorSource, source_for};
pub use stream::{
    ByteCounter, CountingReader, GzipFileReader, HttpConfig, SHARED_RUNTIME, StreamError,
    open_gzip_file, read_gzip_to_string,
};
pub use work_queue::{JobQueue, job_queue, run_workers};
