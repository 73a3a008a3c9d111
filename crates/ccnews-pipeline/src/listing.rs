//! Monthly archive listing (`warc.paths.gz`)

use std::fs;
use std::path::Path;

use ccnews_core::{
    ArchiveError, ArchiveSource, ShutdownSignal, read_gzip_to_string, remove_quietly,
};
use indicatif::ProgressBar;

use crate::state::CrawlMonth;

/// Fetch and decode the archive list for `month`.
///
/// Returns the listed paths in order, relative to the source root. The
/// scratch copy of the listing is deleted after a successful decode.
pub fn list_month(
    source: &dyn ArchiveSource,
    temp_dir: &Path,
    month: CrawlMonth,
    shutdown: &ShutdownSignal,
) -> Result<Vec<String>, ArchiveError> {
    fs::create_dir_all(temp_dir).map_err(ArchiveError::Io)?;
    let scratch = temp_dir.join(format!("warc.paths.{month}.gz"));

    source.fetch(
        &month.listing_path(),
        &scratch,
        &ProgressBar::hidden(),
        shutdown,
    )?;

    let text = read_gzip_to_string(&scratch).map_err(|e| {
        ArchiveError::Format(format!("listing {}: {e}", month.listing_path()))
    })?;
    let paths = parse_listing(&text);
    remove_quietly(&scratch);

    log::debug!("{month}: {} archives listed", paths.len());
    Ok(paths)
}

/// One path per line; blank lines (including the trailing one) are dropped
pub fn parse_listing(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
