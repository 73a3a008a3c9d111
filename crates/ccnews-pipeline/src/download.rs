//! Bounded-concurrency archive downloads.
//!
//! At most `predownloads` archives are in flight. A permit is held from the
//! size probe until the finished download has been handed to the parse
//! queue, so a slow parser stalls new downloads instead of filling the disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::SyncSender;

use ccnews_core::{
    ArchiveError, ArchiveSource, ProgressContext, Semaphore, ShutdownSignal, StreamError,
    remove_quietly,
};
use indicatif::ProgressBar;
use rustc_hash::FxHashSet;

use crate::ledger::CompletionLedger;
use crate::state::{ArchiveName, DownloadTask};
use crate::stats::RunStats;

pub struct DownloadScheduler<'a> {
    source: &'a dyn ArchiveSource,
    temp_dir: &'a Path,
    permits: Semaphore,
    shutdown: &'a ShutdownSignal,
    progress: &'a ProgressContext,
}

impl<'a> DownloadScheduler<'a> {
    pub fn new(
        source: &'a dyn ArchiveSource,
        temp_dir: &'a Path,
        predownloads: usize,
        shutdown: &'a ShutdownSignal,
        progress: &'a ProgressContext,
    ) -> Self {
        Self {
            source,
            temp_dir,
            permits: Semaphore::new(predownloads.max(1)),
            shutdown,
            progress,
        }
    }

    /// Download every listed archive not yet in the ledger and queue it for
    /// parsing. Returns once all downloads have finished or been abandoned;
    /// `jobs` is dropped on return, which closes the parse queue.
    pub fn schedule(
        &self,
        paths: Vec<String>,
        ledger: &CompletionLedger,
        jobs: SyncSender<DownloadTask>,
        stats: &RunStats,
    ) {
        let mut scheduled = FxHashSet::default();
        std::thread::scope(|s| {
            for remote_path in paths {
                if self.shutdown.is_requested() {
                    log::info!("Shutdown requested, not starting more downloads");
                    break;
                }

                let Some(name) = ArchiveName::from_remote_path(&remote_path) else {
                    log::warn!("Skipping unexpected listing entry: {remote_path}");
                    stats.record_failure(
                        &remote_path,
                        &ArchiveError::Format(format!("not a .warc.gz path: {remote_path}")),
                    );
                    continue;
                };

                if ledger.is_complete(&name.corpus_name()) {
                    log::debug!("{}: already complete", name.file_name());
                    stats.record_skip();
                    continue;
                }
                // Two tasks for one name would share a temp file and an output
                if !scheduled.insert(name.corpus_name()) {
                    log::warn!("{}: listed more than once, skipping repeat", name.file_name());
                    stats.record_skip();
                    continue;
                }

                let Some(permit) = self.permits.acquire_unless(self.shutdown) else {
                    log::info!("Shutdown requested, not starting more downloads");
                    break;
                };

                let jobs = jobs.clone();
                s.spawn(move || {
                    let _permit = permit;
                    let pb = self.progress.archive_bar(name.file_name());
                    pb.set_message("downloading");

                    match self.fetch_archive(&remote_path, &name, &pb) {
                        Ok(local_path) => {
                            stats.record_download();
                            pb.finish_and_clear();
                            let task = DownloadTask {
                                remote_path,
                                local_path,
                                name,
                            };
                            // Blocks while parse workers are busy; the permit is held meanwhile
                            if let Err(rejected) = jobs.send(task) {
                                log::warn!(
                                    "Parse queue closed, dropping {}",
                                    rejected.0.name.file_name()
                                );
                                stats.record_cancelled();
                            }
                        }
                        Err(e) => {
                            pb.finish_and_clear();
                            if !e.is_cancelled() {
                                log::error!("{}: download failed: {e}", name.file_name());
                            }
                            stats.record_failure(name.file_name(), &e);
                        }
                    }
                });
            }
        });
        drop(jobs);
    }

    /// Ensure a complete local copy of one archive.
    ///
    /// An existing local file of the expected size is reused; one of any other
    /// size is replaced. Partial files are removed on failure.
    pub fn fetch_archive(
        &self,
        remote_path: &str,
        name: &ArchiveName,
        pb: &ProgressBar,
    ) -> Result<PathBuf, ArchiveError> {
        let local = self.temp_dir.join(name.file_name());
        let expected = self.source.content_length(remote_path)?;

        match fs::metadata(&local) {
            Ok(meta) if meta.len() == expected => {
                log::info!("{}: reusing local copy", name.file_name());
                return Ok(local);
            }
            Ok(meta) => {
                log::warn!(
                    "{}: local copy is {} bytes, expected {expected}; downloading again",
                    name.file_name(),
                    meta.len()
                );
                fs::remove_file(&local).map_err(ArchiveError::Io)?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ArchiveError::Io(e)),
        }

        log::debug!("{}: downloading {expected} bytes", name.file_name());
        match self.source.fetch(remote_path, &local, pb, self.shutdown) {
            Ok(written) if written == expected => Ok(local),
            Ok(written) => {
                remove_quietly(&local);
                Err(ArchiveError::Network(StreamError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("downloaded {written} of {expected} bytes"),
                ))))
            }
            Err(e) => {
                remove_quietly(&local);
                Err(e.into())
            }
        }
    }
}
