//! ccnews - Common Crawl news ingestion
//!
//! Downloads a month of CC-NEWS WARC archives, strips boilerplate from every
//! HTML response and writes one compacted corpus file per archive. Runs are
//! resumable: finished archives are skipped on the next invocation.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "ccnews")]
#[command(about = "Common Crawl news ingestion")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./ccnews.toml or ~/.config/ccnews/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Connect timeout in seconds
    #[arg(long, global = true)]
    connect_timeout: Option<u64>,

    /// Read timeout in seconds for stall detection
    #[arg(long, global = true)]
    read_timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Download and clean one month of archives
    Crawl(cmd::crawl::CrawlArgs),
    /// Show completed and partial outputs for a month
    Status(cmd::status::StatusArgs),
    /// Print entries of a corpus file
    Inspect(cmd::inspect::InspectArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(ccnews_core::ProgressContext::new());

    // Logging:
    //   TTY:     warn unless --debug, the bars show activity
    //   non-TTY: info unless --debug, logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !cli.debug } else { false };
    ccnews_core::init_logging(quiet, cli.debug, multi);

    let mut config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };
    if let Some(secs) = cli.connect_timeout {
        config.http.connect_timeout = secs;
    }
    if let Some(secs) = cli.read_timeout {
        config.http.read_timeout = secs;
    }

    match cli.command {
        Command::Crawl(args) => {
            let shutdown = ccnews_core::ShutdownSignal::new();
            shutdown.install_handlers()?;
            cmd::crawl::run(args, &config, &progress, &shutdown)
        }
        Command::Status(args) => cmd::status::run(args, &config).map(|()| ExitCode::SUCCESS),
        Command::Inspect(args) => cmd::inspect::run(args).map(|()| ExitCode::SUCCESS),
        Command::Config => {
            print_config(&config);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_config(config: &Config) {
    use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

    let pipeline = config.pipeline();
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    table.add_row(vec!["Base URL", &pipeline.base_url]);
    table.add_row(vec![
        "Data directory",
        &pipeline.data_dir.display().to_string(),
    ]);
    table.add_row(vec![
        "Temp directory",
        &pipeline.temp_dir.display().to_string(),
    ]);
    table.add_row(vec![
        "Workers",
        &format!(
            "{} clean, {} download, {} parse",
            pipeline.workers, pipeline.predownloads, pipeline.parse_workers
        ),
    ]);
    table.add_row(vec![
        "Max archives",
        &pipeline
            .max_archives
            .map_or_else(|| "all".to_string(), |n| n.to_string()),
    ]);
    table.add_row(vec!["Removed tags", &pipeline.selectors.tags.join(", ")]);
    table.add_row(vec!["Removed classes", &pipeline.selectors.classes.join(", ")]);
    table.add_row(vec![
        "Class keywords",
        &pipeline.selectors.class_keywords.join(", "),
    ]);
    table.add_row(vec![
        "Removed attributes",
        &pipeline.selectors.attributes.join(", "),
    ]);
    table.add_row(vec![
        "Connect timeout",
        &format!("{}s", config.http.connect_timeout),
    ]);
    table.add_row(vec![
        "Read timeout",
        &format!("{}s", config.http.read_timeout),
    ]);

    eprintln!("\n{table}");
}
