//! Progress display.
//!
//! On a terminal every in-flight archive gets a byte bar under one overall
//! archive counter. Elsewhere all bars are hidden and the pipeline logs
//! per-archive summaries instead.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Visible width of the archive name column
const NAME_WIDTH: usize = 24;

#[derive(Clone, Copy)]
enum Look {
    /// Size unknown yet: name and message only
    Waiting,
    /// Byte progress through one archive
    Bytes,
    /// Archives handed to a parser out of archives pending
    Overall,
    /// Spinner for a setup step
    Stage,
}

fn style(look: Look) -> ProgressStyle {
    let template = match look {
        Look::Waiting => "{prefix:<24.dim} {wide_msg:.dim}",
        Look::Bytes => {
            "{prefix:<24.dim} {bar:30.green/dim} {binary_bytes:>9}/{binary_total_bytes:9} {eta:>4} {wide_msg:.dim}"
        }
        Look::Overall => "{prefix:<24.cyan.bold} {bar:30.cyan/dim} {pos}/{len} archives [{elapsed_precise}]",
        Look::Stage => "{spinner:.green} {prefix:<22.cyan.bold} {wide_msg}",
    };
    // Templates are constants; a parse failure is a programming error
    ProgressStyle::with_template(template)
        .unwrap_or_else(|e| panic!("bad progress template {template:?}: {e}"))
        .progress_chars("━╸─")
}

/// Switch a waiting bar to byte progress once the total is known
pub fn upgrade_to_bar(pb: &ProgressBar, total: u64) {
    pb.set_style(style(Look::Bytes));
    pb.set_length(total);
    pb.set_position(0);
}

/// Owner of all bars for one process
#[derive(Debug)]
pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

impl ProgressContext {
    /// Bars on when stderr is a terminal
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            is_tty: std::io::stderr().is_terminal(),
        }
    }

    /// Bars always off
    pub fn hidden() -> Self {
        Self {
            multi: MultiProgress::new(),
            is_tty: false,
        }
    }

    fn add(&self, look: Look, prefix: String) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new(0));
        pb.set_style(style(look));
        pb.set_prefix(prefix);
        pb
    }

    /// Bar for one archive, labelled with the tail of its file name
    pub fn archive_bar(&self, name: &str) -> ProgressBar {
        self.add(Look::Waiting, short_name(name).to_string())
    }

    /// Counter of archives handed to parsers
    pub fn overall_bar(&self, label: &str, total: usize) -> ProgressBar {
        let pb = self.add(Look::Overall, label.to_string());
        pb.set_length(total as u64);
        pb
    }

    /// Ticking spinner for listing and other setup steps
    pub fn stage_line(&self, name: &str) -> ProgressBar {
        let pb = self.add(Look::Stage, name.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// For routing log output around the bars
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedProgress = Arc<ProgressContext>;

/// Archive names share a long prefix; keep the distinguishing tail
fn short_name(name: &str) -> &str {
    let stem = [".warc.gz", ".wrc.gz"]
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
        .unwrap_or(name);
    let skip = stem.chars().count().saturating_sub(NAME_WIDTH);
    match stem.char_indices().nth(skip) {
        Some((start, _)) => &stem[start..],
        None => stem,
    }
}

/// `1234567` → `"1,234,567"`
pub fn fmt_num(n: usize) -> String {
    let digits = n.to_string();
    let groups: Vec<&str> = digits
        .as_bytes()
        .rchunks(3)
        .rev()
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .collect();
    groups.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fmt_num_groups_thousands() {
        assert_eq!(fmt_num(0), "0");
        assert_eq!(fmt_num(999), "999");
        assert_eq!(fmt_num(1_000), "1,000");
        assert_eq!(fmt_num(12_345_678), "12,345,678");
    }

    #[test]
    fn short_name_keeps_the_tail() {
        assert_eq!(
            short_name("CC-NEWS-20250301004532-00945.warc.gz"),
            "EWS-20250301004532-00945"
        );
        assert_eq!(short_name("short.wrc.gz"), "short");
        assert_eq!(short_name("plain"), "plain");
    }

    #[test]
    fn all_templates_parse() {
        for look in [Look::Waiting, Look::Bytes, Look::Overall, Look::Stage] {
            let _ = style(look);
        }
    }

    #[test]
    fn hidden_context_hides_everything() {
        let ctx = ProgressContext::hidden();
        assert!(!ctx.is_tty());
        assert!(ctx.archive_bar("a.warc.gz").is_hidden());
        assert!(ctx.overall_bar("2025-03", 3).is_hidden());
        assert!(ctx.stage_line("listing").is_hidden());
    }
}
