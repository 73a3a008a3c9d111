//! Status subcommand - compare the ledger with the files on disk

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use ccnews_pipeline::state::CORPUS_SUFFIX;
use ccnews_pipeline::{CompletionLedger, CrawlMonth, LEDGER_FILE};

use super::{file_size, fmt_bytes, parse_month};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Month to inspect (YYYY-MM)
    #[arg(value_parser = parse_month)]
    pub month: CrawlMonth,

    /// Output root (default: from config)
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    /// List every archive, not just the totals
    #[arg(short, long)]
    pub verbose: bool,
}

/// State of one output file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileState {
    /// Ledgered and present
    Complete,
    /// Present but not ledgered: interrupted or failed run
    Partial,
    /// Ledgered but the output file is gone
    Missing,
}

impl FileState {
    fn label(self) -> (&'static str, Color) {
        match self {
            Self::Complete => ("complete", Color::Green),
            Self::Partial => ("partial", Color::Yellow),
            Self::Missing => ("missing", Color::Red),
        }
    }
}

pub fn run(args: StatusArgs, config: &Config) -> Result<()> {
    let data_dir = args.data_dir.unwrap_or_else(|| config.crawl.data_dir.clone());
    let dir = args.month.output_dir(&data_dir);
    if !dir.is_dir() {
        eprintln!("No output for {} in {}", args.month, dir.display());
        return Ok(());
    }

    let states = scan(&dir)?;
    eprintln!("\n{}", render(&dir, &states, args.verbose));
    Ok(())
}

fn scan(dir: &Path) -> Result<BTreeMap<String, (FileState, Option<u64>)>> {
    let ledger = CompletionLedger::open(&dir.join(LEDGER_FILE))
        .with_context(|| format!("Failed to open ledger in {}", dir.display()))?;

    let mut states = BTreeMap::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(CORPUS_SUFFIX) {
            continue;
        }
        let state = if ledger.is_complete(&name) {
            FileState::Complete
        } else {
            FileState::Partial
        };
        let size = file_size(&entry.path());
        states.insert(name, (state, size));
    }
    for key in ledger.keys() {
        states.entry(key).or_insert((FileState::Missing, None));
    }
    Ok(states)
}

fn render(dir: &Path, states: &BTreeMap<String, (FileState, Option<u64>)>, verbose: bool) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS);

    if verbose {
        table.set_header(vec![
            Cell::new("Archive").fg(Color::Cyan),
            Cell::new("State").fg(Color::Cyan),
            Cell::new("Size").fg(Color::Cyan),
        ]);
        for (name, (state, size)) in states {
            let (label, color) = state.label();
            table.add_row(vec![
                Cell::new(name),
                Cell::new(label).fg(color),
                Cell::new(size.map(fmt_bytes).unwrap_or_default()),
            ]);
        }
        return table;
    }

    table.set_header(vec![
        Cell::new(dir.display().to_string())
            .fg(Color::Cyan)
            .add_attribute(comfy_table::Attribute::Bold),
        Cell::new("Archives").fg(Color::Cyan),
        Cell::new("Size").fg(Color::Cyan),
    ]);
    for wanted in [FileState::Complete, FileState::Partial, FileState::Missing] {
        let (count, bytes) = states
            .values()
            .filter(|(state, _)| *state == wanted)
            .fold((0usize, 0u64), |(n, b), (_, size)| (n + 1, b + size.unwrap_or(0)));
        let (label, color) = wanted.label();
        table.add_row(vec![
            Cell::new(label).fg(color),
            Cell::new(ccnews_core::fmt_num(count)),
            Cell::new(fmt_bytes(bytes)),
        ]);
    }
    table
}
