//! Remote archive sources: the Common Crawl HTTP bucket or a local mirror

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use indicatif::ProgressBar;

use crate::progress::upgrade_to_bar;
use crate::shutdown::ShutdownSignal;
use crate::stream::{HttpConfig, SHARED_RUNTIME, StreamError, http_client};

/// Chunk size for local mirror copies (1MB)
const COPY_BUF_SIZE: usize = 1024 * 1024;

/// Where archives and listings are fetched from.
///
/// Paths are relative to the source root, exactly as they appear in a
/// `warc.paths.gz` listing (e.g. `crawl-data/CC-NEWS/2025/03/...warc.gz`).
pub trait ArchiveSource: Send + Sync {
    /// Human readable root, for logs
    fn describe(&self) -> String;

    /// Expected size in bytes of the object at `path`
    fn content_length(&self, path: &str) -> Result<u64, StreamError>;

    /// Copy the object at `path` into `dest`, returning bytes written.
    ///
    /// Observes `shutdown` between chunks and returns
    /// [`StreamError::Cancelled`] when it fires.
    fn fetch(
        &self,
        path: &str,
        dest: &Path,
        pb: &ProgressBar,
        shutdown: &ShutdownSignal,
    ) -> Result<u64, StreamError>;
}

/// Pick a source for `base`: `http(s)://` → HTTP, anything else → local mirror
pub fn source_for(base: &str, http: HttpConfig) -> Result<Box<dyn ArchiveSource>, StreamError> {
    if base.starts_with("http://") || base.starts_with("https://") {
        Ok(Box::new(HttpSource::new(base, http)?))
    } else {
        let root = base.strip_prefix("file://").unwrap_or(base);
        Ok(Box::new(MirrorSource::new(root)))
    }
}

/// Common Crawl over HTTP(S)
pub struct HttpSource {
    base_url: String,
    client: reqwest::Client,
    config: HttpConfig,
}

impl std::fmt::Debug for HttpSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSource")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpSource {
    pub fn new(base_url: &str, config: HttpConfig) -> Result<Self, StreamError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(&config)?,
            config,
        })
    }

    /// Absolute URL for a listing-relative path
    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn fetch_async(
        &self,
        url: &str,
        dest: &Path,
        pb: &ProgressBar,
        shutdown: &ShutdownSignal,
    ) -> Result<u64, StreamError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(StreamError::status(response.status(), url));
        }
        if let Some(total) = response.content_length() {
            upgrade_to_bar(pb, total);
        }

        let mut out = BufWriter::new(File::create(dest)?);
        let mut body = response.bytes_stream();
        let mut written = 0u64;
        loop {
            if shutdown.is_requested() {
                return Err(StreamError::Cancelled);
            }
            let next = tokio::time::timeout(self.config.read_timeout, body.next())
                .await
                .map_err(|_| {
                    StreamError::Io(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("no data for {:?}", self.config.read_timeout),
                    ))
                })?;
            let Some(chunk) = next else { break };
            let chunk = chunk?;
            out.write_all(&chunk)?;
            written += chunk.len() as u64;
            pb.inc(chunk.len() as u64);
        }
        out.flush()?;
        Ok(written)
    }
}

impl ArchiveSource for HttpSource {
    fn describe(&self) -> String {
        self.base_url.clone()
    }

    fn content_length(&self, path: &str) -> Result<u64, StreamError> {
        let url = self.url_for(path);
        SHARED_RUNTIME.handle().block_on(async {
            let response = self.client.head(&url).send().await?;
            if !response.status().is_success() {
                return Err(StreamError::status(response.status(), &url));
            }
            // HEAD bodies are empty, so read the header rather than the body size hint
            response
                .headers()
                .get(reqwest::header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|&n| n > 0)
                .ok_or_else(|| StreamError::NoLength { url: url.clone() })
        })
    }

    fn fetch(
        &self,
        path: &str,
        dest: &Path,
        pb: &ProgressBar,
        shutdown: &ShutdownSignal,
    ) -> Result<u64, StreamError> {
        let url = self.url_for(path);
        SHARED_RUNTIME
            .handle()
            .block_on(self.fetch_async(&url, dest, pb, shutdown))
    }
}

/// A local directory laid out like the Common Crawl bucket
#[derive(Debug, Clone)]
pub struct MirrorSource {
    root: PathBuf,
}

impl MirrorSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl ArchiveSource for MirrorSource {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    fn content_length(&self, path: &str) -> Result<u64, StreamError> {
        Ok(fs::metadata(self.resolve(path))?.len())
    }

    fn fetch(
        &self,
        path: &str,
        dest: &Path,
        pb: &ProgressBar,
        shutdown: &ShutdownSignal,
    ) -> Result<u64, StreamError> {
        let mut input = File::open(self.resolve(path))?;
        upgrade_to_bar(pb, input.metadata()?.len());

        let mut out = BufWriter::new(File::create(dest)?);
        let mut buf = vec![0u8; COPY_BUF_SIZE];
        let mut written = 0u64;
        loop {
            if shutdown.is_requested() {
                return Err(StreamError::Cancelled);
            }
            let n = input.read(&mut buf)?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n])?;
            written += n as u64;
            pb.inc(n as u64);
        }
        out.flush()?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn source_for_picks_http() {
        let src = source_for("https://data.commoncrawl.org/", HttpConfig::default()).unwrap();
        assert_eq!(src.describe(), "https://data.commoncrawl.org");
    }

    #[test]
    fn source_for_picks_mirror() {
        let src = source_for("file:///srv/cc", HttpConfig::default()).unwrap();
        assert_eq!(src.describe(), "/srv/cc");
        let src = source_for("./mirror", HttpConfig::default()).unwrap();
        assert_eq!(src.describe(), "./mirror");
    }

    #[test]
    fn url_for_joins_without_double_slash() {
        let src = HttpSource::new("https://example.test/", HttpConfig::default()).unwrap();
        assert_eq!(
            src.url_for("crawl-data/CC-NEWS/2025/03/warc.paths.gz"),
            "https://example.test/crawl-data/CC-NEWS/2025/03/warc.paths.gz"
        );
        assert_eq!(src.url_for("/a/b"), "https://example.test/a/b");
    }

    #[test]
    fn mirror_fetch_copies_and_measures() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("mirror");
        fs::create_dir_all(root.join("crawl-data")).unwrap();
        fs::write(root.join("crawl-data/a.warc.gz"), b"0123456789").unwrap();

        let src = MirrorSource::new(&root);
        assert_eq!(src.content_length("crawl-data/a.warc.gz").unwrap(), 10);

        let dest = dir.path().join("a.warc.gz");
        let n = src
            .fetch(
                "crawl-data/a.warc.gz",
                &dest,
                &ProgressBar::hidden(),
                &ShutdownSignal::new(),
            )
            .unwrap();
        assert_eq!(n, 10);
        assert_eq!(fs::read(&dest).unwrap(), b"0123456789");
    }

    #[test]
    fn mirror_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let src = MirrorSource::new(dir.path());
        let err = src.content_length("nope.warc.gz").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn mirror_fetch_observes_shutdown() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a"), b"data").unwrap();
        let src = MirrorSource::new(dir.path());
        let shutdown = ShutdownSignal::new();
        shutdown.request();
        let err = src
            .fetch("a", &dir.path().join("b"), &ProgressBar::hidden(), &shutdown)
            .unwrap_err();
        assert!(matches!(err, StreamError::Cancelled));
    }

    #[test]
    fn http_fetch_streams_body_to_file() {
        let server = SHARED_RUNTIME.block_on(MockServer::start());
        SHARED_RUNTIME.block_on(
            Mock::given(method("GET"))
                .and(path("/crawl-data/x.warc.gz"))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello".to_vec()))
                .mount(&server),
        );

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("x.warc.gz");
        let src = HttpSource::new(&server.uri(), HttpConfig::default()).unwrap();
        let n = src
            .fetch(
                "crawl-data/x.warc.gz",
                &dest,
                &ProgressBar::hidden(),
                &ShutdownSignal::new(),
            )
            .unwrap();
        assert_eq!(n, 5);
        assert_eq!(fs::read(&dest).unwrap(), b"hello");
    }

    #[test]
    fn http_fetch_non_success_is_error() {
        let server = SHARED_RUNTIME.block_on(MockServer::start());
        SHARED_RUNTIME.block_on(
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(503))
                .mount(&server),
        );

        let dir = TempDir::new().unwrap();
        let src = HttpSource::new(&server.uri(), HttpConfig::default()).unwrap();
        let err = src
            .fetch(
                "crawl-data/x.warc.gz",
                &dir.path().join("x"),
                &ProgressBar::hidden(),
                &ShutdownSignal::new(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            StreamError::Status { code: 503, .. }
        ));
    }

    #[test]
    fn http_probe_unknown_path_is_not_found() {
        // No mocks mounted: wiremock answers 404
        let server = SHARED_RUNTIME.block_on(MockServer::start());
        let src = HttpSource::new(&server.uri(), HttpConfig::default()).unwrap();
        let err = src.content_length("crawl-data/missing.warc.gz").unwrap_err();
        assert!(err.is_not_found());
    }
}
