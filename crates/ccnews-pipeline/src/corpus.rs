//! Compacted corpus container (`.wrc.gz`).
//!
//! A gzip stream of entries, each laid out as
//!
//! ```text
//! {url}\n{byte length of body}\n{body}\n\n
//! ```
//!
//! Writing goes to `<name>.tmp` and is renamed into place on finish, so a
//! reader never observes a half-written container under the final name.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufRead, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, SyncSender};

use ccnews_core::{ErrorFlag, GzipFileReader, open_gzip_file, tmp_path_for};
use flate2::Compression;
use flate2::write::GzEncoder;
use indicatif::ProgressBar;

/// Sync-flush the compressor every N entries
pub const FLUSH_EVERY: usize = 1000;

const WRITE_BUF_SIZE: usize = 256 * 1024;

/// A cleaned response ready for the corpus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedDocument {
    pub url: String,
    pub html: String,
}

/// An entry read back from a corpus file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusEntry {
    pub url: String,
    pub body: Vec<u8>,
}

impl CorpusEntry {
    pub fn body_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Totals for one finished container
#[derive(Debug, Clone)]
pub struct CorpusStats {
    pub path: PathBuf,
    pub entries: usize,
    /// Uncompressed body bytes
    pub bytes: u64,
}

/// Write one entry in container layout
pub fn encode_entry<W: Write>(out: &mut W, url: &str, body: &[u8]) -> io::Result<()> {
    write!(out, "{url}\n{}\n", body.len())?;
    out.write_all(body)?;
    out.write_all(b"\n\n")
}

pub struct CorpusWriter {
    encoder: GzEncoder<BufWriter<File>>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    entries: usize,
    bytes: u64,
}

impl CorpusWriter {
    /// Start a container that will land at `final_path` on [`finish`](Self::finish)
    pub fn create(final_path: &Path) -> io::Result<Self> {
        let tmp_path = tmp_path_for(final_path);
        let file = File::create(&tmp_path)?;
        Ok(Self {
            encoder: GzEncoder::new(
                BufWriter::with_capacity(WRITE_BUF_SIZE, file),
                Compression::default(),
            ),
            tmp_path,
            final_path: final_path.to_path_buf(),
            entries: 0,
            bytes: 0,
        })
    }

    pub fn write_entry(&mut self, doc: &CleanedDocument) -> io::Result<()> {
        if doc.url.contains('\n') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("URL contains a newline: {:?}", doc.url),
            ));
        }
        encode_entry(&mut self.encoder, &doc.url, doc.html.as_bytes())?;
        self.entries += 1;
        self.bytes += doc.html.len() as u64;
        if self.entries % FLUSH_EVERY == 0 {
            self.encoder.flush()?;
        }
        Ok(())
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Finish the gzip stream, sync, and rename into place
    pub fn finish(self) -> io::Result<CorpusStats> {
        let mut buffered = self.encoder.finish()?;
        buffered.flush()?;
        let file = buffered.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&self.tmp_path, &self.final_path)?;
        Ok(CorpusStats {
            path: self.final_path,
            entries: self.entries,
            bytes: self.bytes,
        })
    }

    /// Drop the in-progress file
    pub fn abandon(self) {
        let tmp = self.tmp_path.clone();
        drop(self.encoder);
        ccnews_core::remove_quietly(&tmp);
    }

    /// Drain `rx` until every sender is gone, then finish.
    ///
    /// On a write failure `error_flag` is raised, the tmp file is removed and
    /// the error returned; dropping `rx` makes further sends fail.
    pub fn run(
        mut self,
        rx: Receiver<CleanedDocument>,
        error_flag: &ErrorFlag,
        pb: &ProgressBar,
    ) -> io::Result<CorpusStats> {
        for doc in rx {
            if let Err(e) = self.write_entry(&doc) {
                error_flag.raise();
                log::error!("Write to {} failed: {e}", self.tmp_path.display());
                self.abandon();
                return Err(e);
            }
            if self.entries % FLUSH_EVERY == 0 {
                pb.set_message(format!("{} docs", ccnews_core::fmt_num(self.entries)));
            }
        }
        match self.finish() {
            Ok(stats) => Ok(stats),
            Err(e) => {
                error_flag.raise();
                Err(e)
            }
        }
    }
}

/// Producer handle for a writer thread
#[derive(Clone)]
pub struct CorpusSink {
    sender: SyncSender<CleanedDocument>,
    error_flag: ErrorFlag,
}

impl CorpusSink {
    pub fn new(sender: SyncSender<CleanedDocument>, error_flag: ErrorFlag) -> Self {
        Self { sender, error_flag }
    }

    /// Queue a document; blocks while the writer is behind.
    ///
    /// Fails fast once the writer has reported an error.
    pub fn send(&self, doc: CleanedDocument) -> io::Result<()> {
        if self.error_flag.is_raised() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "corpus writer failed"));
        }
        self.sender
            .send(doc)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "corpus writer closed"))
    }
}

#[derive(Debug)]
pub enum CorpusFormatError {
    Io(io::Error),
    /// Length line is not a decimal integer
    BadLength { url: String, line: String },
    /// Input ended inside an entry
    Truncated { url: String },
    /// Body not followed by a blank line
    MissingTerminator { url: String },
}

impl fmt::Display for CorpusFormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO: {e}"),
            Self::BadLength { url, line } => write!(f, "{url}: bad length line {line:?}"),
            Self::Truncated { url } => write!(f, "{url}: entry truncated"),
            Self::MissingTerminator { url } => write!(f, "{url}: missing entry terminator"),
        }
    }
}

impl std::error::Error for CorpusFormatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Streaming reader over decompressed container bytes.
///
/// Yields entries until end of input; stops after the first error.
pub struct CorpusReader<R> {
    inner: R,
    line: String,
    failed: bool,
}

impl<R: BufRead> CorpusReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line: String::new(),
            failed: false,
        }
    }

    fn read_entry(&mut self) -> Result<Option<CorpusEntry>, CorpusFormatError> {
        self.line.clear();
        if self.inner.read_line(&mut self.line).map_err(CorpusFormatError::Io)? == 0 {
            return Ok(None);
        }
        let url = match self.line.strip_suffix('\n') {
            Some(url) => url.to_string(),
            None => {
                return Err(CorpusFormatError::Truncated {
                    url: self.line.clone(),
                });
            }
        };

        self.line.clear();
        if self.inner.read_line(&mut self.line).map_err(CorpusFormatError::Io)? == 0 {
            return Err(CorpusFormatError::Truncated { url });
        }
        let raw = self.line.trim_end_matches('\n');
        let len: usize = raw.parse().map_err(|_| CorpusFormatError::BadLength {
            url: url.clone(),
            line: raw.to_string(),
        })?;

        let mut body = vec![0u8; len];
        let mut terminator = [0u8; 2];
        for buf in [&mut body[..], &mut terminator[..]] {
            self.inner.read_exact(buf).map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => CorpusFormatError::Truncated { url: url.clone() },
                _ => CorpusFormatError::Io(e),
            })?;
        }
        if &terminator != b"\n\n" {
            return Err(CorpusFormatError::MissingTerminator { url });
        }
        Ok(Some(CorpusEntry { url, body }))
    }
}

impl<R: BufRead> Iterator for CorpusReader<R> {
    type Item = Result<CorpusEntry, CorpusFormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.read_entry() {
            Ok(entry) => entry.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Open a `.wrc.gz` file for reading
pub fn open_corpus(path: &Path) -> io::Result<CorpusReader<GzipFileReader>> {
    let (reader, _, _) = open_gzip_file(path)?;
    Ok(CorpusReader::new(reader))
}

/// Read a whole container from memory (decompressed bytes)
pub fn read_entries<R: Read>(
    reader: R,
) -> Result<Vec<CorpusEntry>, CorpusFormatError> {
    CorpusReader::new(io::BufReader::new(reader)).collect()
}
