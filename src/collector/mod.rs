//! Record collector module
//!
//! Audit records arrive as NDJSON, one raw record object per line, from
//! stdin or a file written by whatever subscribes to the Security log
//! (a WMI or Get-WinEvent shipper, a log forwarder). A reader task pushes
//! lines into a bounded queue and a single consumer hands them to the
//! [`RecordHandler`] in arrival order, so handlers are never re-entered.
//!
//! Lines are decoded lossily: invalid UTF-8 or an unterminated last line
//! still reach the handler and are dropped there as malformed. A line longer
//! than the configured cap is cut at the cap and the rest skipped, so the cut
//! prefix is dropped as malformed too.

use crate::models::Outcome;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

const TARGET_COLLECTOR: &str = "collector";

/// Default cap on one NDJSON line (1 MiB)
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Consumer of raw NDJSON lines
pub trait RecordHandler: Send + Sync {
    fn handle_line(&self, line: &str) -> Outcome;
}

/// Where raw records are read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordSource {
    Stdin,
    File(PathBuf),
}

impl RecordSource {
    pub fn from_path(path: Option<PathBuf>) -> Self {
        match path {
            Some(path) => Self::File(path),
            None => Self::Stdin,
        }
    }
}

/// Counters returned when a collection run ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorStats {
    /// Non-blank lines read from the source
    pub lines_read: u64,
    /// Lines handed to the handler
    pub processed: u64,
}

/// Reads a record source until end of input or shutdown
pub struct Collector {
    shutdown: Arc<AtomicBool>,
    wake: Notify,
    capacity: usize,
    max_line_bytes: usize,
}

impl Collector {
    /// `capacity` bounds the queue between the reader and the consumer.
    pub fn new(capacity: usize) -> Self {
        Self {
            shutdown: Arc::new(AtomicBool::new(false)),
            wake: Notify::new(),
            capacity: capacity.max(1),
            max_line_bytes: MAX_LINE_BYTES,
        }
    }

    /// Override the per-line length cap.
    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes.max(1);
        self
    }

    pub async fn run(
        &self,
        source: RecordSource,
        handler: Arc<dyn RecordHandler>,
    ) -> io::Result<CollectorStats> {
        match source {
            RecordSource::Stdin => {
                info!(target: TARGET_COLLECTOR, "Reading audit records from stdin");
                self.run_from(tokio::io::stdin(), handler).await
            }
            RecordSource::File(path) => {
                info!(target: TARGET_COLLECTOR, path = ?path, "Reading audit records from file");
                let file = tokio::fs::File::open(&path).await?;
                self.run_from(file, handler).await
            }
        }
    }

    /// Collect from any async reader.
    pub async fn run_from<R>(
        &self,
        reader: R,
        handler: Arc<dyn RecordHandler>,
    ) -> io::Result<CollectorStats>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<String>(self.capacity);
        let reader_task = tokio::spawn(read_lines(
            BufReader::new(reader),
            tx,
            self.max_line_bytes,
        ));

        let mut stats = CollectorStats::default();
        while !self.is_shutdown() {
            let line = tokio::select! {
                _ = self.wake.notified() => break,
                line = rx.recv() => line,
            };
            let Some(line) = line else {
                break;
            };
            stats.processed += 1;
            handler.handle_line(&line);
        }
        drop(rx);

        if self.is_shutdown() {
            // A blocked stdin read never observes the closed queue.
            reader_task.abort();
            debug!(
                target: TARGET_COLLECTOR,
                processed = stats.processed,
                "Collector stopped early"
            );
            return Ok(stats);
        }

        stats.lines_read = match reader_task.await {
            Ok(result) => result?,
            Err(err) => return Err(io::Error::other(err)),
        };
        info!(
            target: TARGET_COLLECTOR,
            lines = stats.lines_read,
            processed = stats.processed,
            "End of input"
        );
        Ok(stats)
    }

    /// Signal graceful shutdown
    pub fn shutdown(&self) {
        info!(target: TARGET_COLLECTOR, "Collector shutdown requested");
        self.shutdown.store(true, Ordering::Relaxed);
        self.wake.notify_one();
    }

    /// Check if shutdown has been requested
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

async fn read_lines<R>(mut reader: R, tx: mpsc::Sender<String>, max_len: usize) -> io::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut count = 0u64;
    loop {
        buf.clear();
        let limit = u64::try_from(max_len).unwrap_or(u64::MAX).saturating_add(1);
        if (&mut reader).take(limit).read_until(b'\n', &mut buf).await? == 0 {
            return Ok(count);
        }
        if buf.len() > max_len && buf.last() != Some(&b'\n') {
            skip_line(&mut reader).await?;
            buf.truncate(max_len);
            warn!(
                target: TARGET_COLLECTOR,
                max_len,
                "Record line exceeds length cap, truncated"
            );
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }
        count += 1;
        if tx.send(line.to_string()).await.is_err() {
            warn!(target: TARGET_COLLECTOR, "Record queue closed, reader stopping");
            return Ok(count);
        }
    }
}

/// Consume input up to and including the next newline.
async fn skip_line<R>(reader: &mut R) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let (consumed, done) = {
            let available = reader.fill_buf().await?;
            match available.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (available.len(), available.is_empty()),
            }
        };
        reader.consume(consumed);
        if done {
            return Ok(());
        }
    }
}
