//! HTTP client, shared runtime and local gzip readers.
//!
//! Network calls run on one process-wide tokio runtime and are driven from
//! plain worker threads with `block_on`, so pipeline stages stay synchronous.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use flate2::read::MultiGzDecoder;

/// Buffer size for decompressed archive readers (256KB)
const GZIP_BUF_SIZE: usize = 256 * 1024;

/// Timeouts applied to every HTTP request of a source.
#[derive(Debug, Clone, Copy)]
pub struct HttpConfig {
    /// Max time to establish a connection
    pub connect_timeout: Duration,
    /// Max silence between two body chunks before the transfer is abandoned
    pub read_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
        }
    }
}

/// Failure to fetch or probe a remote object
#[derive(Debug)]
pub enum StreamError {
    /// Server answered with a non-success status
    Status { code: u16, url: String },
    /// No usable response: DNS, connect, TLS, reset mid-body
    Transport(String),
    /// Probe answered without a positive Content-Length
    NoLength { url: String },
    Io(io::Error),
    /// Transfer stopped because shutdown was requested
    Cancelled,
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status { code, url } => write!(f, "{url} returned HTTP {code}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::NoLength { url } => write!(f, "{url}: missing or invalid Content-Length"),
            Self::Io(e) => write!(f, "{e}"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl StreamError {
    pub fn status(status: reqwest::StatusCode, url: &str) -> Self {
        Self::Status {
            code: status.as_u16(),
            url: url.to_string(),
        }
    }

    /// 404 from a server or a missing mirror file
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Status { code, .. } => *code == 404,
            Self::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<io::Error> for StreamError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Self::Status {
                code: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            },
            None => Self::Transport(e.to_string()),
        }
    }
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("ccnews-http")
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Build an HTTP client with connection pooling for one source.
pub fn http_client(config: &HttpConfig) -> Result<reqwest::Client, StreamError> {
    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .pool_max_idle_per_host(8)
        .user_agent(concat!("ccnews/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(StreamError::from)
}

/// Shared byte counter for progress tracking
pub type ByteCounter = Arc<AtomicU64>;

/// Buffered, decompressing reader over a local gzip file
pub type GzipFileReader = BufReader<MultiGzDecoder<CountingReader<File>>>;

/// Open a local (multi-member) gzip file for streaming decompression.
///
/// WARC archives are a concatenation of independently gzipped records, so a
/// multi-member decoder is required. The counter tracks compressed bytes
/// consumed, which is what progress bars measure against the file size.
///
/// Returns (reader, byte_counter, compressed_len)
pub fn open_gzip_file(path: &Path) -> io::Result<(GzipFileReader, ByteCounter, u64)> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    let counter = Arc::new(AtomicU64::new(0));
    let counting = CountingReader::new(file, counter.clone());
    let reader = BufReader::with_capacity(GZIP_BUF_SIZE, MultiGzDecoder::new(counting));
    Ok((reader, counter, len))
}

/// Decompress a whole gzip file into memory (small files only)
pub fn read_gzip_to_string(path: &Path) -> io::Result<String> {
    let (mut reader, _, _) = open_gzip_file(path)?;
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    Ok(text)
}

/// Reader wrapper that tracks bytes read
pub struct CountingReader<R> {
    inner: R,
    count: ByteCounter,
}

impl<R> CountingReader<R> {
    pub fn new(inner: R, count: ByteCounter) -> Self {
        Self { inner, count }
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::TempDir;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn display_names_the_url() {
        let err = StreamError::Status {
            code: 404,
            url: "https://data.test/a.warc.gz".to_string(),
        };
        assert_eq!(err.to_string(), "https://data.test/a.warc.gz returned HTTP 404");
        assert!(err.is_not_found());
    }

    #[test]
    fn not_found_detection() {
        assert!(StreamError::Io(io::Error::from(io::ErrorKind::NotFound)).is_not_found());
        assert!(!StreamError::Transport("reset".into()).is_not_found());
        assert!(!StreamError::Cancelled.is_not_found());
        let unavailable = StreamError::Status {
            code: 503,
            url: String::new(),
        };
        assert!(!unavailable.is_not_found());
    }

    #[test]
    fn multi_member_gzip_is_fully_decoded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("two.gz");
        let mut bytes = gzip(b"first member\n");
        bytes.extend(gzip(b"second member\n"));
        std::fs::write(&path, &bytes).unwrap();

        let text = read_gzip_to_string(&path).unwrap();
        assert_eq!(text, "first member\nsecond member\n");
    }

    #[test]
    fn counter_tracks_compressed_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.gz");
        let bytes = gzip(&vec![b'a'; 10_000]);
        std::fs::write(&path, &bytes).unwrap();

        let (mut reader, counter, len) = open_gzip_file(&path).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out.len(), 10_000);
        assert_eq!(len, bytes.len() as u64);
        assert_eq!(counter.load(Ordering::Relaxed), len);
    }

    #[test]
    fn invalid_gzip_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.gz");
        std::fs::write(&path, b"definitely not gzip").unwrap();
        assert!(read_gzip_to_string(&path).is_err());
    }
}
