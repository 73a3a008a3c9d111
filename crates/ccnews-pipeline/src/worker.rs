//! Per-archive processing: read → clean → write → mark.
//!
//! Three stages run concurrently for one archive:
//! 1. the calling thread streams response records out of the gzip file,
//! 2. `clean_workers` threads turn raw responses into cleaned HTML,
//! 3. a writer thread owns the output container.
//!
//! Queues between stages are bounded to `clean_workers * 2`. The archive is
//! marked complete only if the stream ended cleanly and the writer finished.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::sync_channel;
use std::time::Instant;

use ccnews_core::progress::upgrade_to_bar;
use ccnews_core::{
    ArchiveError, ErrorFlag, ShutdownSignal, job_queue, open_gzip_file, run_workers,
};
use indicatif::ProgressBar;

use crate::corpus::{CleanedDocument, CorpusSink, CorpusWriter};
use crate::filter::ContentFilter;
use crate::ledger::CompletionLedger;
use crate::state::DownloadTask;
use crate::stats::ArchiveStats;
use crate::warc::{StreamEnd, WarcReader, WarcRecord};

/// Shared, read-only inputs of every parse worker
pub struct ArchiveContext<'a> {
    pub filter: &'a ContentFilter,
    pub ledger: &'a CompletionLedger,
    pub shutdown: &'a ShutdownSignal,
    pub output_dir: &'a Path,
    pub clean_workers: usize,
}

/// Outcome of one archive. Stats are filled in even when it failed.
#[derive(Debug)]
pub struct ArchiveReport {
    pub stats: ArchiveStats,
    pub result: Result<(), ArchiveError>,
    /// The ledger already had this archive; nothing was done
    pub already_complete: bool,
}

/// Parse one downloaded archive into its output container.
///
/// Partial output is kept (renamed into place) when the archive stops on
/// framing errors, truncation or shutdown, but only a clean end is recorded
/// in the ledger. A failed write discards the output.
pub fn process_archive(
    task: &DownloadTask,
    ctx: &ArchiveContext,
    pb: &ProgressBar,
) -> ArchiveReport {
    let start = Instant::now();
    let key = task.key();
    let mut stats = ArchiveStats {
        name: task.name.file_name().to_string(),
        ..Default::default()
    };

    if ctx.ledger.is_complete(&key) {
        log::debug!("{key}: completed by another worker");
        return ArchiveReport {
            stats,
            result: Ok(()),
            already_complete: true,
        };
    }

    let result = parse_into_corpus(task, &key, ctx, pb, &mut stats);
    stats.elapsed = start.elapsed();
    ArchiveReport {
        stats,
        result,
        already_complete: false,
    }
}

fn parse_into_corpus(
    task: &DownloadTask,
    key: &str,
    ctx: &ArchiveContext,
    pb: &ProgressBar,
    stats: &mut ArchiveStats,
) -> Result<(), ArchiveError> {
    let (reader, bytes_read, total) =
        open_gzip_file(&task.local_path).map_err(ArchiveError::Io)?;
    upgrade_to_bar(pb, total);

    let writer = CorpusWriter::create(&ctx.output_dir.join(key)).map_err(ArchiveError::Write)?;

    let workers = ctx.clean_workers.max(1);
    let capacity = workers * 2;
    let error_flag = ErrorFlag::new();
    let (doc_tx, doc_rx) = sync_channel::<CleanedDocument>(capacity);
    let sink = CorpusSink::new(doc_tx, error_flag.clone());
    let (record_tx, records) = job_queue::<WarcRecord>(capacity);
    let dropped = AtomicUsize::new(0);

    let mut warc = WarcReader::new(reader);
    let mut cancelled = false;

    let written = std::thread::scope(|s| {
        let writer_flag = error_flag.clone();
        let writer_pb = pb.clone();
        let writer_handle = s.spawn(move || writer.run(doc_rx, &writer_flag, &writer_pb));

        let filter = ctx.filter;
        let dropped = &dropped;
        let cleaners = s.spawn(move || {
            run_workers(workers, &records, |_, record: WarcRecord| {
                match filter.clean_response(&record.body) {
                    Ok(html) => {
                        // A failed send means the writer is gone; the reader
                        // sees the error flag and stops.
                        let _ = sink.send(CleanedDocument {
                            url: record.url,
                            html,
                        });
                    }
                    Err(e) => {
                        dropped.fetch_add(1, Ordering::Relaxed);
                        log::trace!("{}: {e}", record.url);
                    }
                }
            });
            // Last sink handle goes here, closing the writer's channel
            drop(sink);
        });

        while let Some(record) = warc.next_response() {
            if ctx.shutdown.is_requested() {
                cancelled = true;
                break;
            }
            if error_flag.is_raised() || record_tx.send(record).is_err() {
                break;
            }
            pb.set_position(bytes_read.load(Ordering::Relaxed));
        }
        drop(record_tx);

        if let Err(panic) = cleaners.join() {
            std::panic::resume_unwind(panic);
        }
        match writer_handle.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    });

    let (end, reader_stats) = warc.finish();
    stats.reader = reader_stats;
    stats.dropped = dropped.into_inner();

    let corpus = written.map_err(ArchiveError::Write)?;
    stats.written = corpus.entries;

    if cancelled {
        log::info!("{key}: interrupted after {} docs, not marked complete", corpus.entries);
        return Err(ArchiveError::Cancelled);
    }
    match end {
        Some(StreamEnd::Clean) => {
            ctx.ledger.mark_complete(key).map_err(ArchiveError::Io)?;
            Ok(())
        }
        Some(StreamEnd::TooManyErrors { consecutive }) => {
            Err(ArchiveError::Framing { consecutive })
        }
        Some(StreamEnd::Truncated(e)) => Err(ArchiveError::Format(format!(
            "archive ends mid-record: {e}"
        ))),
        // Reader stopped early without a write error: the clean stage is gone
        None => Err(ArchiveError::Write(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "clean workers stopped before the archive was read",
        ))),
    }
}
