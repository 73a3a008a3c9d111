//! Pipeline orchestration for one crawl month

use std::fs;
use std::time::Instant;

use anyhow::{Context, anyhow};
use ccnews_core::{
    ArchiveSource, JobQueue, ProgressContext, ShutdownSignal, cleanup_tmp_files, job_queue,
    remove_quietly, source_for,
};
use indicatif::ProgressBar;
use rustc_hash::FxHashSet;

use crate::config::Config;
use crate::download::DownloadScheduler;
use crate::filter::ContentFilter;
use crate::ledger::{CompletionLedger, LEDGER_FILE};
use crate::listing::list_month;
use crate::state::{ArchiveName, CrawlMonth, DownloadTask};
use crate::stats::{RunStats, RunSummary};
use crate::worker::{ArchiveContext, process_archive};

/// Run the pipeline for `month` against the source named by `config.base_url`
pub fn run_month(
    config: &Config,
    month: CrawlMonth,
    shutdown: &ShutdownSignal,
    progress: &ProgressContext,
) -> anyhow::Result<RunSummary> {
    let source = source_for(&config.base_url, config.http)
        .map_err(|e| anyhow!("Failed to create source for {}: {e}", config.base_url))?;
    run(config, month, source.as_ref(), shutdown, progress)
}

/// Run the pipeline for `month`.
///
/// Setup failures (directories, ledger, listing) abort the run. Per-archive
/// failures are logged and counted in the summary; they never stop other
/// archives.
pub fn run(
    config: &Config,
    month: CrawlMonth,
    source: &dyn ArchiveSource,
    shutdown: &ShutdownSignal,
    progress: &ProgressContext,
) -> anyhow::Result<RunSummary> {
    let start = Instant::now();

    let output_dir = month.output_dir(&config.data_dir);
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    fs::create_dir_all(&config.temp_dir)
        .with_context(|| format!("Failed to create {}", config.temp_dir.display()))?;
    let stale = cleanup_tmp_files(&output_dir)
        .with_context(|| format!("Failed to clean {}", output_dir.display()))?;
    if stale > 0 {
        log::info!("Removed {stale} stale tmp files");
    }

    let ledger = CompletionLedger::open(&output_dir.join(LEDGER_FILE))
        .with_context(|| format!("Failed to open ledger in {}", output_dir.display()))?;

    let stage = progress.stage_line("listing");
    stage.set_message(format!("{month} from {}", source.describe()));
    log::info!("Listing {month} from {}...", source.describe());
    let listed = list_month(source, &config.temp_dir, month, shutdown);
    stage.finish_and_clear();
    let mut paths = listed.map_err(|e| anyhow!("Failed to list {month}: {e}"))?;
    log::info!("{month}: {} archives listed, {} already complete", paths.len(), ledger.len());

    if let Some(max) = config.max_archives {
        paths.truncate(max);
    }
    if paths.is_empty() {
        log::warn!("No archives to process");
        return Ok(RunSummary::empty(month));
    }
    let total = paths.len();
    let pending = paths
        .iter()
        .filter_map(|p| ArchiveName::from_remote_path(p))
        .map(|name| name.corpus_name())
        .filter(|key| !ledger.is_complete(key))
        .collect::<FxHashSet<_>>()
        .len();

    log::info!(
        "Processing {total} archives: {} downloads ahead, {} parsers x {} clean workers",
        config.predownloads,
        config.parse_workers,
        config.workers
    );

    let filter = ContentFilter::new(&config.selectors);
    let stats = RunStats::new();
    let scheduler = DownloadScheduler::new(
        source,
        &config.temp_dir,
        config.predownloads,
        shutdown,
        progress,
    );
    let ctx = ArchiveContext {
        filter: &filter,
        ledger: &ledger,
        shutdown,
        output_dir: &output_dir,
        clean_workers: config.workers,
    };

    let parse_workers = config.parse_workers.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(parse_workers)
        .thread_name(|i| format!("parse-{i}"))
        .build()
        .context("Failed to create parse pool")?;

    // Queue holds downloaded archives waiting for a parser
    let (job_tx, jobs) = job_queue::<DownloadTask>(config.predownloads.max(1));
    let overall = progress.overall_bar(&month.to_string(), pending);

    std::thread::scope(|s| {
        let (scheduler, ledger, stats) = (&scheduler, &ledger, &stats);
        s.spawn(move || scheduler.schedule(paths, ledger, job_tx, stats));

        pool.install(|| {
            rayon::scope(|rs| {
                for worker_id in 0..parse_workers {
                    let (jobs, ctx, stats, overall) = (&jobs, &ctx, stats, &overall);
                    rs.spawn(move |_| parse_loop(worker_id, jobs, ctx, stats, progress, overall));
                }
            });
        });
    });
    overall.finish_and_clear();

    let mut summary = stats.into_summary(month, total, start.elapsed());
    summary.interrupted = shutdown.is_requested();
    summary.log();
    Ok(summary)
}

/// Parse downloaded archives until the queue closes
fn parse_loop(
    worker_id: usize,
    jobs: &JobQueue<DownloadTask>,
    ctx: &ArchiveContext,
    stats: &RunStats,
    progress: &ProgressContext,
    overall: &ProgressBar,
) {
    while let Some(task) = jobs.next() {
        overall.inc(1);
        if ctx.shutdown.is_requested() {
            // The downloaded file stays in the temp dir and is reused next run
            log::info!(
                "[parse-{worker_id}] shutdown: leaving {} for the next run",
                task.name.file_name()
            );
            stats.record_cancelled();
            continue;
        }

        let pb = progress.archive_bar(task.name.file_name());
        pb.set_message("parsing");
        let report = process_archive(&task, ctx, &pb);
        pb.finish_and_clear();

        if !report.result.as_ref().is_err_and(|e| e.is_cancelled()) {
            remove_quietly(&task.local_path);
        }

        stats.record_archive(&report.stats);
        match &report.result {
            Ok(()) if report.already_complete => stats.record_skip(),
            Ok(()) => {
                stats.record_completed();
                if !progress.is_tty() {
                    report.stats.log();
                }
            }
            Err(e) => {
                if !e.is_cancelled() {
                    log::error!("{}: {e}", task.name.file_name());
                }
                stats.record_failure(task.name.file_name(), e);
            }
        }
    }
}
