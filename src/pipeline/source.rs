//! Journal source abstraction for the CLI driver.
//!
//! The game writes one JSON object per line. Sources yield parsed
//! [`JournalEvent`]s and skip lines that do not parse.

use crate::types::JournalEvent;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

/// Errors raised by journal sources
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to open journal {}: {1}", .0.display())]
    Open(PathBuf, #[source] std::io::Error),
    #[error("failed to read journal: {0}")]
    Read(#[from] std::io::Error),
}

/// Events produced by a journal source.
#[derive(Debug)]
pub enum SourceEvent {
    /// A journal entry with a valid `event` field.
    Event(JournalEvent),
    /// No more data.
    Eof,
}

/// Where journal entries come from.
///
/// The driver calls [`next_event`](JournalSource::next_event) inside a
/// `select!` with cancellation.
#[async_trait]
pub trait JournalSource: Send + 'static {
    async fn next_event(&mut self) -> Result<SourceEvent, SourceError>;

    /// Human-readable name for logging ("stdin", "file").
    fn source_name(&self) -> &str;
}

/// Newline-delimited JSON reader shared by the concrete sources.
struct LineReader<R> {
    reader: R,
    line_buffer: String,
    line_no: u64,
}

impl<R: AsyncBufRead + Unpin + Send> LineReader<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            line_buffer: String::with_capacity(2048),
            line_no: 0,
        }
    }

    async fn next_event(&mut self, source: &str) -> Result<SourceEvent, SourceError> {
        loop {
            self.line_buffer.clear();
            let bytes = self.reader.read_line(&mut self.line_buffer).await?;
            if bytes == 0 {
                return Ok(SourceEvent::Eof);
            }
            self.line_no += 1;

            let line = self.line_buffer.trim();
            if line.is_empty() {
                continue;
            }
            match JournalEvent::from_json_str(line) {
                Ok(event) => return Ok(SourceEvent::Event(event)),
                Err(e) => {
                    tracing::warn!(source, line = self.line_no, error = %e, "Skipping journal line");
                }
            }
        }
    }
}

// ============================================================================
// Stdin Source
// ============================================================================

/// Reads journal lines from stdin, e.g. `tail -F Journal.*.log | edsts-relay --stdin`.
pub struct StdinSource {
    lines: LineReader<BufReader<tokio::io::Stdin>>,
}

impl StdinSource {
    pub fn new() -> Self {
        Self {
            lines: LineReader::new(BufReader::new(tokio::io::stdin())),
        }
    }
}

impl Default for StdinSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JournalSource for StdinSource {
    async fn next_event(&mut self) -> Result<SourceEvent, SourceError> {
        self.lines.next_event("stdin").await
    }

    fn source_name(&self) -> &str {
        "stdin"
    }
}

// ============================================================================
// File Source (journal replay)
// ============================================================================

/// Replays a journal file with an optional pause between entries.
pub struct FileSource {
    lines: LineReader<BufReader<tokio::fs::File>>,
    delay: Duration,
    yielded_first: bool,
}

impl FileSource {
    pub async fn open(path: &Path, delay: Duration) -> Result<Self, SourceError> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| SourceError::Open(path.to_path_buf(), e))?;
        Ok(Self {
            lines: LineReader::new(BufReader::new(file)),
            delay,
            yielded_first: false,
        })
    }
}

#[async_trait]
impl JournalSource for FileSource {
    async fn next_event(&mut self) -> Result<SourceEvent, SourceError> {
        // No pause before the first entry
        if self.yielded_first && !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let event = self.lines.next_event("file").await?;
        self.yielded_first = true;
        Ok(event)
    }

    fn source_name(&self) -> &str {
        "file"
    }
}
