//! Log setup.
//!
//! Terminal output goes through `MultiProgress::suspend` so log lines and
//! progress bars never interleave. Piped output gets plain timestamped lines.

use std::io::Write;

use indicatif::MultiProgress;

/// Fixed-width tag and ANSI colour code per level
fn level_tag(level: log::Level) -> (&'static str, &'static str) {
    match level {
        log::Level::Error => ("ERROR", "31"),
        log::Level::Warn => ("WARN ", "33"),
        log::Level::Info => ("INFO ", "32"),
        log::Level::Debug => ("DEBUG", "36"),
        log::Level::Trace => ("TRACE", "35"),
    }
}

/// Coloured terminal line. With `target`, the emitting module is shown too.
fn render_tty(record: &log::Record, target: bool) -> String {
    let (tag, color) = level_tag(record.level());
    if target {
        format!(
            "\x1b[{color}m{tag}\x1b[0m \x1b[2m{}\x1b[0m {}",
            record.target(),
            record.args()
        )
    } else {
        format!("\x1b[{color}m{tag}\x1b[0m {}", record.args())
    }
}

/// Filter used when `RUST_LOG` is unset: our crates at the chosen level,
/// everything else at warn.
fn default_filter(quiet: bool, debug: bool) -> String {
    let level = match (debug, quiet) {
        (true, _) => "debug",
        (false, true) => "warn",
        (false, false) => "info",
    };
    ["ccnews_core", "ccnews_pipeline", "ccnews"]
        .iter()
        .fold(String::from("warn"), |mut filter, krate| {
            filter.push_str(&format!(",{krate}={level}"));
            filter
        })
}

/// `log` backend that prints around live progress bars
pub struct IndicatifLogger {
    filter: env_logger::Logger,
    multi: MultiProgress,
    show_target: bool,
}

impl IndicatifLogger {
    pub fn new(filter: env_logger::Logger, multi: MultiProgress, show_target: bool) -> Self {
        Self {
            filter,
            multi,
            show_target,
        }
    }
}

impl log::Log for IndicatifLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.filter.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if !self.filter.matches(record) {
            return;
        }
        let line = render_tty(record, self.show_target);
        self.multi.suspend(|| eprintln!("{line}"));
    }

    fn flush(&self) {}
}

/// Install the global logger.
///
/// Pass `multi` when bars are drawn (TTY). Without it, lines carry a
/// millisecond timestamp and no colour. `RUST_LOG` overrides the level
/// chosen from `quiet`/`debug`. Calling twice is harmless.
pub fn init_logging(quiet: bool, debug: bool, multi: Option<&MultiProgress>) {
    let env = env_logger::Env::default().default_filter_or(default_filter(quiet, debug));
    let mut builder = env_logger::Builder::from_env(env);

    let Some(multi) = multi else {
        let _ = builder
            .format(|buf, record| {
                let (tag, _) = level_tag(record.level());
                writeln!(buf, "{} {tag} {}", buf.timestamp_millis(), record.args())
            })
            .try_init();
        return;
    };

    let filter = builder.build();
    let max_level = filter.filter();
    let logger = IndicatifLogger::new(filter, multi.clone(), debug);
    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(max_level);
    }
}
