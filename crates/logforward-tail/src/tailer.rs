use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use logforward_types::LogEntry;

use crate::buffer::RecordBuffer;
use crate::filter::CompiledTarget;
use crate::identity::{FileChange, FileIdentity};
use crate::metrics::{FileErrorKind, Metrics};

/// Wait between polls once a file has no new data
pub const EOF_BACKOFF: Duration = Duration::from_millis(200);

/// Upper bound on each send while flushing during shutdown
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything a tailer shares with the other tailers of its target
#[derive(Clone)]
pub struct TailContext {
    pub target: Arc<CompiledTarget>,
    pub hostname: Arc<str>,
    pub metrics: Arc<dyn Metrics>,
}

/// Why the read loop stopped
enum Exit {
    /// Cancelled, possibly while holding an entry that could not be queued
    Cancelled(Option<LogEntry>),
    ReadFailed(std::io::Error),
    SeekFailed,
    QueueClosed,
}

/// Open handle plus everything read from it but not yet emitted
struct Cursor {
    reader: BufReader<File>,
    identity: FileIdentity,
    /// Bytes of a line whose terminator has not been written yet
    partial: Vec<u8>,
    record: RecordBuffer,
}

/// Follows one file across rotation and truncation, emitting finished records
pub struct Tailer {
    path: PathBuf,
    /// Path as used in metric labels
    label: String,
    /// File base name, used as the entry source
    source: String,
    ctx: TailContext,
    out: mpsc::Sender<LogEntry>,
    cancel: CancellationToken,
}

impl Tailer {
    pub fn new(
        path: PathBuf,
        ctx: TailContext,
        out: mpsc::Sender<LogEntry>,
        cancel: CancellationToken,
    ) -> Self {
        let label = path.display().to_string();
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| label.clone());

        Self {
            path,
            label,
            source,
            ctx,
            out,
            cancel,
        }
    }

    /// Tail until cancelled or a read fails. Only content written after
    /// startup is forwarded.
    pub async fn run(self) {
        let Some(mut cursor) = self.open_at_end().await else {
            return;
        };
        debug!(path = %self.path.display(), offset = cursor.identity.size(), "tailing file");

        match self.read_loop(&mut cursor).await {
            Exit::Cancelled(interrupted) => {
                info!(path = %self.path.display(), "shutting down collector");
                self.drain(&mut cursor, interrupted).await;
            }
            Exit::ReadFailed(err) => {
                warn!(path = %self.path.display(), error = %err, "read failed, stopping tailer");
                self.ctx
                    .metrics
                    .increment_file_error(&self.label, FileErrorKind::Read);
                // The loop ends either way; the flush is best effort.
                let _ = self.flush(&mut cursor.record).await;
            }
            Exit::SeekFailed => {}
            Exit::QueueClosed => {
                debug!(path = %self.path.display(), "output queue closed, stopping tailer");
            }
        }
    }

    async fn open_at_end(&self) -> Option<Cursor> {
        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to open file");
                self.ctx
                    .metrics
                    .increment_file_error(&self.label, FileErrorKind::Open);
                return None;
            }
        };

        if let Err(err) = file.seek(SeekFrom::End(0)).await {
            warn!(path = %self.path.display(), error = %err, "failed to seek to end of file");
            self.ctx
                .metrics
                .increment_file_error(&self.label, FileErrorKind::Seek);
            return None;
        }

        let identity = match file.metadata().await {
            Ok(metadata) => FileIdentity::from_metadata(&metadata),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to stat open file");
                self.ctx
                    .metrics
                    .increment_file_error(&self.label, FileErrorKind::Open);
                return None;
            }
        };

        Some(Cursor {
            reader: BufReader::new(file),
            identity,
            partial: Vec::new(),
            record: RecordBuffer::new(),
        })
    }

    async fn read_loop(&self, cursor: &mut Cursor) -> Exit {
        loop {
            if self.cancel.is_cancelled() {
                return Exit::Cancelled(None);
            }

            match cursor.reader.read_until(b'\n', &mut cursor.partial).await {
                Ok(_) if cursor.partial.ends_with(b"\n") => {
                    let line = take_line(&mut cursor.partial);
                    if let Err(exit) = self.process_line(line, &mut cursor.record).await {
                        return exit;
                    }
                }
                // Nothing new, or only an unterminated tail: wait for more.
                Ok(_) => {
                    if let Err(exit) = self.handle_eof(cursor).await {
                        return exit;
                    }
                }
                Err(err) => return Exit::ReadFailed(err),
            }
        }
    }

    async fn handle_eof(&self, cursor: &mut Cursor) -> Result<(), Exit> {
        let current = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => Some(FileIdentity::from_metadata(&metadata)),
            Err(err) => {
                debug!(path = %self.path.display(), error = %err, "path unavailable, waiting");
                None
            }
        };

        match current.map(|c| (cursor.identity.classify(&c), c)) {
            Some((FileChange::Rotated, current)) => {
                info!(path = %self.path.display(), "file rotation detected");
                match File::open(&self.path).await {
                    Ok(file) => {
                        self.finish_rotated(cursor).await?;
                        let identity = match file.metadata().await {
                            Ok(metadata) => FileIdentity::from_metadata(&metadata),
                            Err(_) => current,
                        };
                        cursor.reader = BufReader::new(file);
                        cursor.identity = identity;
                        return Ok(());
                    }
                    Err(err) => {
                        debug!(path = %self.path.display(), error = %err, "rotated file not readable yet");
                    }
                }
            }
            Some((FileChange::Truncated, current)) => {
                info!(path = %self.path.display(), "file truncation detected");
                cursor.record.clear();
                cursor.partial.clear();
                if let Err(err) = cursor.reader.seek(SeekFrom::Start(0)).await {
                    warn!(path = %self.path.display(), error = %err, "failed to seek to start after truncation");
                    self.ctx
                        .metrics
                        .increment_file_error(&self.label, FileErrorKind::SeekStart);
                    return Err(Exit::SeekFailed);
                }
                cursor.identity = current;
                return Ok(());
            }
            Some((FileChange::Unchanged, _)) | None => {}
        }

        if let Ok(metadata) = cursor.reader.get_ref().metadata().await {
            cursor.identity = cursor.identity.with_size(metadata.len());
        }

        tokio::select! {
            _ = self.cancel.cancelled() => Err(Exit::Cancelled(None)),
            _ = tokio::time::sleep(EOF_BACKOFF) => Ok(()),
        }
    }

    /// Read whatever the old handle still holds, then flush it as final.
    async fn finish_rotated(&self, cursor: &mut Cursor) -> Result<(), Exit> {
        loop {
            match cursor.reader.read_until(b'\n', &mut cursor.partial).await {
                Ok(_) if cursor.partial.ends_with(b"\n") => {
                    let line = take_line(&mut cursor.partial);
                    self.process_line(line, &mut cursor.record).await?;
                }
                Ok(_) => break,
                Err(err) => {
                    debug!(path = %self.path.display(), error = %err, "failed to drain rotated file");
                    break;
                }
            }
        }

        if !cursor.partial.is_empty() {
            let line = take_line(&mut cursor.partial);
            self.process_line(line, &mut cursor.record).await?;
        }
        self.flush(&mut cursor.record).await
    }

    async fn process_line(&self, line: String, record: &mut RecordBuffer) -> Result<(), Exit> {
        if !self.ctx.target.is_multiline() {
            return self.finalize(line).await;
        }

        // The new line must be buffered before any cancellable await.
        let finished = if self.ctx.target.starts_record(&line) {
            record.take()
        } else {
            None
        };
        record.push_line(&line);

        match finished {
            Some(text) => self.finalize(text).await,
            None => Ok(()),
        }
    }

    async fn flush(&self, record: &mut RecordBuffer) -> Result<(), Exit> {
        match record.take() {
            Some(text) => self.finalize(text).await,
            None => Ok(()),
        }
    }

    async fn finalize(&self, text: String) -> Result<(), Exit> {
        match self.build_entry(&text) {
            Some(entry) => self.emit(entry).await,
            None => Ok(()),
        }
    }

    /// Trim, drop empty or excluded records, and enrich the rest
    fn build_entry(&self, text: &str) -> Option<LogEntry> {
        let event = text.trim();
        if event.is_empty() || self.ctx.target.is_excluded(event) {
            return None;
        }

        Some(LogEntry {
            time: Utc::now().timestamp(),
            host: self.ctx.hostname.to_string(),
            source: self.source.clone(),
            source_type: self.ctx.target.name().to_string(),
            event: event.to_string(),
            fields: self.ctx.target.fields(),
        })
    }

    /// Block until the queue has room, unless cancelled first
    async fn emit(&self, entry: LogEntry) -> Result<(), Exit> {
        let permit = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Exit::Cancelled(Some(entry))),
            permit = self.out.reserve() => match permit {
                Ok(permit) => permit,
                Err(_) => return Err(Exit::QueueClosed),
            },
        };

        permit.send(entry);
        self.ctx
            .metrics
            .increment_lines_processed(&self.label, self.ctx.target.name());
        Ok(())
    }

    /// Best-effort flush on cancellation. Content not yet read is not
    /// re-read; only what is already buffered goes out.
    async fn drain(&self, cursor: &mut Cursor, interrupted: Option<LogEntry>) {
        let mut pending: Vec<LogEntry> = interrupted.into_iter().collect();

        if !cursor.partial.is_empty() {
            let line = take_line(&mut cursor.partial);
            if !self.ctx.target.is_multiline() {
                pending.extend(self.build_entry(&line));
            } else {
                if self.ctx.target.starts_record(&line) {
                    if let Some(text) = cursor.record.take() {
                        pending.extend(self.build_entry(&text));
                    }
                }
                cursor.record.push_line(&line);
            }
        }
        if let Some(text) = cursor.record.take() {
            pending.extend(self.build_entry(&text));
        }

        for entry in pending {
            match tokio::time::timeout(DRAIN_TIMEOUT, self.out.send(entry)).await {
                Ok(Ok(())) => {
                    self.ctx
                        .metrics
                        .increment_lines_processed(&self.label, self.ctx.target.name());
                }
                Ok(Err(_)) | Err(_) => {
                    warn!(path = %self.path.display(), "dropping buffered entries during shutdown");
                    return;
                }
            }
        }
    }
}

fn take_line(buf: &mut Vec<u8>) -> String {
    let line = String::from_utf8_lossy(buf).into_owned();
    buf.clear();
    line
}
