pub mod crawl;
pub mod inspect;
pub mod status;

use std::path::Path;

use ccnews_pipeline::CrawlMonth;
use chrono::{Datelike, NaiveDate};

/// Parse `YYYY-MM` into a crawl month
pub fn parse_month(s: &str) -> Result<CrawlMonth, String> {
    let date = NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d")
        .map_err(|e| format!("expected YYYY-MM, got {s:?}: {e}"))?;
    let year = u16::try_from(date.year()).map_err(|_| format!("year out of range: {s}"))?;
    CrawlMonth::new(year, date.month() as u8).ok_or_else(|| format!("invalid month: {s}"))
}

/// Human readable byte size
pub fn fmt_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn file_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}
