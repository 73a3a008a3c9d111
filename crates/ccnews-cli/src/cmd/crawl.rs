//! Crawl subcommand - ingest one month of CC-NEWS

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use ccnews_core::{SharedProgress, ShutdownSignal, fmt_num};
use ccnews_pipeline::{CrawlMonth, RunSummary};

use super::parse_month;
use crate::config::Config;

/// Exit status after an interrupted run
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Args, Debug)]
pub struct CrawlArgs {
    /// Month to ingest (YYYY-MM)
    #[arg(value_parser = parse_month)]
    pub month: CrawlMonth,

    /// Clean workers per archive
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Archives downloaded ahead of parsing
    #[arg(short, long)]
    pub predownloads: Option<usize>,

    /// Archives parsed concurrently
    #[arg(long)]
    pub parse_workers: Option<usize>,

    /// Archive root (URL or local mirror directory)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Output root; files land in <data-dir>/YYYY/MM
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    /// Scratch directory for downloads
    #[arg(long)]
    pub temp_dir: Option<PathBuf>,

    /// Only process the first N listed archives
    #[arg(short = 'l', long)]
    pub limit: Option<usize>,
}

pub fn run(
    args: CrawlArgs,
    config: &Config,
    progress: &SharedProgress,
    shutdown: &ShutdownSignal,
) -> Result<ExitCode> {
    let mut file_config = config.clone();
    let crawl = &mut file_config.crawl;
    if let Some(w) = args.workers {
        crawl.workers = w;
    }
    if let Some(p) = args.predownloads {
        crawl.predownloads = Some(p);
    }
    if let Some(p) = args.parse_workers {
        crawl.parse_workers = Some(p);
    }
    if let Some(url) = args.base_url {
        crawl.base_url = url;
    }
    if let Some(dir) = args.data_dir {
        crawl.data_dir = dir;
    }
    if let Some(dir) = args.temp_dir {
        crawl.temp_dir = dir;
    }
    if args.limit.is_some() {
        crawl.max_archives = args.limit;
    }
    let pipeline_config = file_config.pipeline();

    let summary = ccnews_pipeline::run_month(&pipeline_config, args.month, shutdown, progress)?;
    eprintln!("\n{}", summary_table(&summary));

    if summary.interrupted {
        log::warn!("Interrupted; rerun the same command to resume");
        return Ok(ExitCode::from(EXIT_INTERRUPTED));
    }
    if summary.failed() > 0 {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn summary_table(summary: &RunSummary) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new(format!("CC-NEWS {}", summary.month))
                .fg(Color::Cyan)
                .add_attribute(comfy_table::Attribute::Bold),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    table.add_row(vec!["Archives listed".to_string(), fmt_num(summary.listed)]);
    table.add_row(vec!["Already complete".to_string(), fmt_num(summary.skipped)]);
    table.add_row(vec!["Downloaded".to_string(), fmt_num(summary.downloaded)]);
    table.add_row(vec![
        Cell::new("Completed"),
        Cell::new(fmt_num(summary.completed)).fg(Color::Green),
    ]);
    if summary.cancelled > 0 {
        table.add_row(vec![
            Cell::new("Left for next run"),
            Cell::new(fmt_num(summary.cancelled)).fg(Color::Yellow),
        ]);
    }
    for (kind, count) in summary.failures_by_kind() {
        table.add_row(vec![
            Cell::new(format!("Failed ({kind})")),
            Cell::new(fmt_num(count)).fg(Color::Red),
        ]);
    }
    table.add_row(vec!["Responses".to_string(), fmt_num(summary.responses)]);
    table.add_row(vec!["Documents written".to_string(), fmt_num(summary.written)]);
    if summary.malformed > 0 {
        table.add_row(vec!["Malformed records".to_string(), fmt_num(summary.malformed)]);
    }
    if summary.dropped > 0 {
        table.add_row(vec!["Dropped responses".to_string(), fmt_num(summary.dropped)]);
    }
    table.add_row(vec![
        "Elapsed".to_string(),
        format!("{:.1}s", summary.elapsed.as_secs_f64()),
    ]);
    table
}
