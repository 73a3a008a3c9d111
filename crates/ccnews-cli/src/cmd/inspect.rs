//! Inspect subcommand - print entries of a `.wrc.gz` corpus

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use ccnews_pipeline::{CorpusEntry, open_corpus, text_preview};

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Corpus file to read
    pub file: PathBuf,

    /// Stop after N entries (0 = all)
    #[arg(short = 'l', long, default_value_t = 10)]
    pub limit: usize,

    /// Print a visible-text preview of each entry
    #[arg(short, long)]
    pub text: bool,

    /// Preview length in characters
    #[arg(long, default_value_t = 2000)]
    pub chars: usize,
}

pub fn run(args: InspectArgs) -> Result<()> {
    let reader = open_corpus(&args.file)
        .with_context(|| format!("Failed to open {}", args.file.display()))?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let mut seen = 0usize;
    let mut total_bytes = 0u64;
    for entry in reader {
        let entry = entry.with_context(|| format!("Corrupt corpus {}", args.file.display()))?;
        total_bytes += entry.body.len() as u64;
        if args.limit == 0 || seen < args.limit {
            write_entry(&mut out, &entry, &args)?;
        }
        seen += 1;
    }
    out.flush()?;

    log::info!(
        "{}: {} entries, {} body bytes",
        args.file.display(),
        ccnews_core::fmt_num(seen),
        ccnews_core::fmt_num(total_bytes as usize)
    );
    Ok(())
}

fn write_entry<W: Write>(out: &mut W, entry: &CorpusEntry, args: &InspectArgs) -> io::Result<()> {
    writeln!(out, "{}\t{}", entry.url, entry.body.len())?;
    if args.text {
        let text = text_preview(&entry.body_str(), args.chars);
        writeln!(out, "    {text}")?;
    }
    Ok(())
}
