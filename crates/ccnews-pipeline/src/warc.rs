//! Streaming WARC record reader.
//!
//! Yields only `response` records. Every other record type is skipped by its
//! declared length. Framing problems (missing or unparsable Content-Length on
//! a response) are counted; a well-framed record resets the count, and more
//! than [`MAX_CONSECUTIVE_ERRORS`] in a row aborts the stream.
//!
//! The reader never loads a whole archive: it walks a `BufRead` one header
//! block and one body at a time.

use std::io::{self, BufRead, Read};

/// Consecutive malformed records tolerated before giving up on an archive
pub const MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// Upper bound for the initial body allocation; larger bodies grow as read
const BODY_PREALLOC_LIMIT: u64 = 1 << 20;

/// Largest response body buffered in memory. Common Crawl truncates payloads
/// at 1 MiB, so anything far beyond that is a corrupt length.
pub const MAX_RESPONSE_BYTES: u64 = 16 << 20;

/// A response record: target URL plus the raw HTTP response (headers and body)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarcRecord {
    pub url: String,
    pub body: Vec<u8>,
}

/// Why the record stream stopped
#[derive(Debug)]
pub enum StreamEnd {
    /// End of input at a record boundary
    Clean,
    /// Read failure or short body; the archive is incomplete
    Truncated(io::Error),
    /// Framing error bound exceeded
    TooManyErrors { consecutive: u32 },
}

impl StreamEnd {
    /// Only a clean end makes an archive eligible for the ledger
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean)
    }
}

/// Counters for one archive
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReaderStats {
    /// Header blocks read
    pub records: usize,
    /// Response records yielded
    pub responses: usize,
    /// Non-response records skipped
    pub skipped: usize,
    /// Records with framing errors
    pub malformed: usize,
}

/// Header fields of one record, in order of appearance
#[derive(Debug, Default)]
struct WarcHeader {
    fields: Vec<(String, String)>,
}

impl WarcHeader {
    fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field names compare case-insensitively
    fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

enum RecordError {
    Malformed(String),
    Io(io::Error),
}

pub struct WarcReader<R> {
    inner: R,
    line: Vec<u8>,
    consecutive_errors: u32,
    max_response: u64,
    stats: ReaderStats,
    end: Option<StreamEnd>,
}

impl<R: BufRead> WarcReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_max_response(inner, MAX_RESPONSE_BYTES)
    }

    /// Responses declaring more than `max_response` bytes are skipped
    /// unread and counted as malformed.
    pub fn with_max_response(inner: R, max_response: u64) -> Self {
        Self {
            inner,
            line: Vec::with_capacity(256),
            consecutive_errors: 0,
            max_response,
            stats: ReaderStats::default(),
            end: None,
        }
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    /// How the stream ended; `None` while records may still follow
    pub fn end(&self) -> Option<&StreamEnd> {
        self.end.as_ref()
    }

    /// Consume the reader, returning its end state and counters
    pub fn finish(self) -> (Option<StreamEnd>, ReaderStats) {
        (self.end, self.stats)
    }

    /// Next response record, or `None` once the stream has ended.
    pub fn next_response(&mut self) -> Option<WarcRecord> {
        if self.end.is_some() {
            return None;
        }
        loop {
            let header = match self.read_header() {
                Ok(Some(h)) => h,
                Ok(None) => {
                    self.end = Some(StreamEnd::Clean);
                    return None;
                }
                Err(e) => {
                    self.end = Some(StreamEnd::Truncated(e));
                    return None;
                }
            };
            // Blank lines separating records
            if header.is_empty() {
                continue;
            }
            self.stats.records += 1;

            match self.read_record(&header) {
                Ok(Some(record)) => {
                    self.consecutive_errors = 0;
                    self.stats.responses += 1;
                    return Some(record);
                }
                Ok(None) => {
                    self.consecutive_errors = 0;
                    self.stats.skipped += 1;
                }
                Err(RecordError::Malformed(reason)) => {
                    self.stats.malformed += 1;
                    self.consecutive_errors += 1;
                    log::debug!(
                        "Malformed WARC record ({}/{}): {reason}",
                        self.consecutive_errors,
                        MAX_CONSECUTIVE_ERRORS
                    );
                    if self.consecutive_errors > MAX_CONSECUTIVE_ERRORS {
                        self.end = Some(StreamEnd::TooManyErrors {
                            consecutive: self.consecutive_errors,
                        });
                        return None;
                    }
                }
                Err(RecordError::Io(e)) => {
                    self.stats.malformed += 1;
                    self.consecutive_errors += 1;
                    self.end = Some(StreamEnd::Truncated(e));
                    return None;
                }
            }
        }
    }

    /// Read header lines up to the first blank line.
    ///
    /// `Ok(None)` means end of input before any byte of a new header.
    fn read_header(&mut self) -> io::Result<Option<WarcHeader>> {
        let mut header = WarcHeader::default();
        let mut first = true;
        loop {
            self.line.clear();
            let n = self.inner.read_until(b'\n', &mut self.line)?;
            if n == 0 {
                if first {
                    return Ok(None);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "end of input inside a record header",
                ));
            }
            first = false;

            let line = String::from_utf8_lossy(&self.line);
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                return Ok(Some(header));
            }
            if !self.line.ends_with(b"\n") {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "end of input inside a record header",
                ));
            }
            if let Some((name, value)) = line.split_once(':') {
                header
                    .fields
                    .push((name.trim().to_string(), value.trim().to_string()));
            }
        }
    }

    fn read_record(&mut self, header: &WarcHeader) -> Result<Option<WarcRecord>, RecordError> {
        let is_response = header.get("WARC-Type") == Some("response");
        let length = match header.get("Content-Length") {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                RecordError::Malformed(format!("unparsable Content-Length {raw:?}"))
            })?,
            None if is_response => {
                return Err(RecordError::Malformed(
                    "response without Content-Length".to_string(),
                ));
            }
            None => 0,
        };

        if !is_response {
            self.skip(length)?;
            return Ok(None);
        }

        let Some(url) = header.get("WARC-Target-URI").map(str::to_string) else {
            self.skip(length)?;
            return Err(RecordError::Malformed(
                "response without WARC-Target-URI".to_string(),
            ));
        };

        if length > self.max_response {
            self.skip(length)?;
            return Err(RecordError::Malformed(format!(
                "{url}: Content-Length {length} exceeds {} bytes",
                self.max_response
            )));
        }

        let mut body = Vec::with_capacity(length.min(BODY_PREALLOC_LIMIT) as usize);
        (&mut self.inner)
            .take(length)
            .read_to_end(&mut body)
            .map_err(RecordError::Io)?;
        if (body.len() as u64) < length {
            return Err(short_read(body.len() as u64, length));
        }
        Ok(Some(WarcRecord { url, body }))
    }

    fn skip(&mut self, length: u64) -> Result<(), RecordError> {
        let skipped = io::copy(&mut (&mut self.inner).take(length), &mut io::sink())
            .map_err(RecordError::Io)?;
        if skipped < length {
            return Err(short_read(skipped, length));
        }
        Ok(())
    }
}

fn short_read(got: u64, want: u64) -> RecordError {
    RecordError::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("record body truncated: {got} of {want} bytes"),
    ))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Serialize one WARC record the way Common Crawl lays them out
    pub(crate) fn record(warc_type: &str, url: &str, payload: &[u8]) -> Vec<u8> {
        let mut out = format!(
            "WARC/1.0\r\nWARC-Type: {warc_type}\r\nWARC-Target-URI: {url}\r\nContent-Length: {}\r\n\r\n",
            payload.len()
        )
        .into_bytes();
        out.extend_from_slice(payload);
        out.extend_from_slice(b"\r\n\r\n");
        out
    }

    /// A response header with a broken length and no body
    pub(crate) fn malformed_response() -> Vec<u8> {
        b"WARC/1.0\r\nWARC-Type: response\r\nWARC-Target-URI: http://bad.test/\r\nContent-Length: nope\r\n\r\n"
            .to_vec()
    }

    pub(crate) fn http_response(html: &str) -> Vec<u8> {
        format!("HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n{html}").into_bytes()
    }

    fn read_all(input: &[u8]) -> (Vec<WarcRecord>, Option<StreamEnd>, ReaderStats) {
        let mut reader = WarcReader::new(input);
        let mut out = Vec::new();
        while let Some(r) = reader.next_response() {
            out.push(r);
        }
        let (end, stats) = reader.finish();
        (out, end, stats)
    }

    #[test]
    fn yields_only_responses() {
        let mut input = record("warcinfo", "", b"software: test");
        input.extend(record("request", "http://a.test/", b"GET / HTTP/1.1\r\n\r\n"));
        input.extend(record("response", "http://a.test/", &http_response("<p>a</p>")));
        input.extend(record("metadata", "http://a.test/", b"fetchTimeMs: 12"));
        input.extend(record("response", "http://b.test/", &http_response("<p>b</p>")));

        let (records, end, stats) = read_all(&input);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].url, "http://a.test/");
        assert_eq!(records[1].url, "http://b.test/");
        assert_eq!(records[1].body, http_response("<p>b</p>"));
        assert!(end.unwrap().is_clean());
        assert_eq!(stats.skipped, 3);
        assert_eq!(stats.responses, 2);
    }

    #[test]
    fn empty_input_is_clean() {
        let (records, end, _) = read_all(b"");
        assert!(records.is_empty());
        assert!(end.unwrap().is_clean());
    }

    #[test]
    fn header_fields_are_trimmed_and_case_insensitive() {
        let input = b"WARC/1.0\r\nwarc-type:   response  \r\nWARC-Target-URI:http://c.test/x?a=b:c\r\ncontent-length: 2\r\nno colon here\r\n\r\nhi\r\n\r\n";
        let (records, end, _) = read_all(input);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, "http://c.test/x?a=b:c");
        assert_eq!(records[0].body, b"hi");
        assert!(end.unwrap().is_clean());
    }

    #[test]
    fn aborts_after_eleven_malformed() {
        let mut input = record("response", "http://ok.test/1", &http_response("1"));
        input.extend(record("response", "http://ok.test/2", &http_response("2")));
        for _ in 0..11 {
            input.extend(malformed_response());
        }
        input.extend(record("response", "http://never.test/", &http_response("x")));

        let (records, end, stats) = read_all(&input);
        assert_eq!(records.len(), 2);
        assert!(matches!(
            end,
            Some(StreamEnd::TooManyErrors { consecutive: 11 })
        ));
        assert_eq!(stats.malformed, 11);
    }

    #[test]
    fn ten_malformed_then_eof_is_clean() {
        let mut input = record("response", "http://ok.test/", &http_response("ok"));
        for _ in 0..10 {
            input.extend(malformed_response());
        }
        let (records, end, stats) = read_all(&input);
        assert_eq!(records.len(), 1);
        assert!(end.unwrap().is_clean());
        assert_eq!(stats.malformed, 10);
    }

    #[test]
    fn valid_record_resets_error_count() {
        let mut input = Vec::new();
        for round in 0..3 {
            for _ in 0..10 {
                input.extend(malformed_response());
            }
            input.extend(record(
                "response",
                &format!("http://ok.test/{round}"),
                &http_response("ok"),
            ));
        }
        let (records, end, stats) = read_all(&input);
        assert_eq!(records.len(), 3);
        assert!(end.unwrap().is_clean());
        assert_eq!(stats.malformed, 30);
    }

    #[test]
    fn truncated_body_is_not_clean() {
        let mut input = record("response", "http://ok.test/", &http_response("ok"));
        let full = record("response", "http://cut.test/", &http_response("a long body here"));
        input.extend_from_slice(&full[..full.len() - 12]);

        let (records, end, _) = read_all(&input);
        assert_eq!(records.len(), 1);
        let end = end.unwrap();
        assert!(!end.is_clean());
        assert!(matches!(end, StreamEnd::Truncated(_)));
    }

    #[test]
    fn truncated_header_is_not_clean() {
        let mut input = record("response", "http://ok.test/", &http_response("ok"));
        input.extend_from_slice(b"WARC/1.0\r\nWARC-Type: resp");
        let (records, end, _) = read_all(&input);
        assert_eq!(records.len(), 1);
        assert!(matches!(end, Some(StreamEnd::Truncated(_))));
    }

    #[test]
    fn non_response_without_length_is_skipped() {
        let mut input = b"WARC/1.0\r\nWARC-Type: warcinfo\r\n\r\n".to_vec();
        input.extend(record("response", "http://ok.test/", &http_response("ok")));
        let (records, end, stats) = read_all(&input);
        assert_eq!(records.len(), 1);
        assert!(end.unwrap().is_clean());
        assert_eq!(stats.malformed, 0);
    }

    #[test]
    fn response_without_uri_is_malformed_but_framed() {
        let mut input =
            b"WARC/1.0\r\nWARC-Type: response\r\nContent-Length: 3\r\n\r\nabc\r\n\r\n".to_vec();
        input.extend(record("response", "http://ok.test/", &http_response("ok")));
        let (records, end, stats) = read_all(&input);
        assert_eq!(records.len(), 1);
        assert_eq!(stats.malformed, 1);
        assert!(end.unwrap().is_clean());
    }

    #[test]
    fn oversized_response_is_skipped_as_malformed() {
        let mut input = record("response", "http://big.test/", &vec![b'a'; 4096]);
        input.extend(record("response", "http://ok.test/", &http_response("ok")));

        let mut reader = WarcReader::with_max_response(input.as_slice(), 1024);
        let first = reader.next_response().unwrap();
        assert_eq!(first.url, "http://ok.test/");
        assert!(reader.next_response().is_none());
        let (end, stats) = reader.finish();
        assert!(end.unwrap().is_clean());
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.responses, 1);
    }

    #[test]
    fn oversized_length_past_end_is_truncated() {
        let mut input = record("response", "http://ok.test/", &http_response("ok"));
        input.extend_from_slice(
            b"WARC/1.0\r\nWARC-Type: response\r\nWARC-Target-URI: http://x.test/\r\nContent-Length: 90000000000\r\n\r\nshort",
        );
        let (records, end, _) = read_all(&input);
        assert_eq!(records.len(), 1);
        assert!(matches!(end, Some(StreamEnd::Truncated(_))));
    }
}
