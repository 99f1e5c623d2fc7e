use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use logforward_types::{LogEntry, OutputFormat};

/// Upper bound on how long written output may sit in the buffer
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(500);

/// Single consumer of the entry queue, writing one record per line
pub struct OutputWriter<W> {
    sink: BufWriter<W>,
    format: OutputFormat,
    flush_interval: Duration,
}

impl<W: AsyncWrite + Unpin + Send> OutputWriter<W> {
    pub fn new(sink: W, format: OutputFormat) -> Self {
        Self {
            sink: BufWriter::new(sink),
            format,
            flush_interval: FLUSH_INTERVAL,
        }
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Drain the queue until every sender is gone, then flush and hand the
    /// sink back.
    pub async fn run(mut self, mut rx: mpsc::Receiver<LogEntry>) -> W {
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                entry = rx.recv() => match entry {
                    Some(entry) => self.write_entry(&entry).await,
                    None => break,
                },
                _ = ticker.tick() => {
                    if let Err(err) = self.sink.flush().await {
                        warn!(error = %err, "failed to flush output");
                    }
                }
            }
        }

        debug!("output queue closed, flushing");
        if let Err(err) = self.sink.flush().await {
            warn!(error = %err, "failed to flush output on shutdown");
        }
        self.sink.into_inner()
    }

    async fn write_entry(&mut self, entry: &LogEntry) {
        let line = match encode(entry, self.format) {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, source = %entry.source, "failed to encode log entry");
                return;
            }
        };

        if let Err(err) = self.sink.write_all(&line).await {
            warn!(error = %err, format = self.format.as_str(), "failed to write log entry");
        }
    }
}

/// Serialize an entry as one newline-terminated record
pub fn encode(entry: &LogEntry, format: OutputFormat) -> serde_json::Result<Vec<u8>> {
    let mut line = match format {
        OutputFormat::Json => serde_json::to_vec(entry)?,
        OutputFormat::Raw => entry.event.as_bytes().to_vec(),
    };
    line.push(b'\n');
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::io;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::task::{Context, Poll};

    fn entry(event: &str) -> LogEntry {
        LogEntry {
            time: 1_700_000_000,
            host: "test-host".to_string(),
            source: "x.log".to_string(),
            source_type: "t".to_string(),
            event: event.to_string(),
            fields: None,
        }
    }

    async fn write_all(entries: Vec<LogEntry>, format: OutputFormat) -> String {
        let (tx, rx) = mpsc::channel(8);
        let writer = tokio::spawn(OutputWriter::new(Vec::new(), format).run(rx));
        for e in entries {
            tx.send(e).await.unwrap();
        }
        drop(tx);
        String::from_utf8(writer.await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_json_output() {
        let out = write_all(vec![entry("hello")], OutputFormat::Json).await;
        let value: serde_json::Value = serde_json::from_str(out.trim_end()).unwrap();
        assert_eq!(value["source"], "x.log");
        assert_eq!(value["sourcetype"], "t");
        assert_eq!(value["event"], "hello");
        assert_eq!(value["time"], 1_700_000_000);
        assert!(value.get("fields").is_none());
        assert!(out.ends_with('\n'));
    }

    #[tokio::test]
    async fn test_json_output_with_fields() {
        let mut e = entry("hello");
        e.fields = Some(Arc::new(BTreeMap::from([(
            "env".to_string(),
            "prod".to_string(),
        )])));
        let out = write_all(vec![e], OutputFormat::Json).await;
        let value: serde_json::Value = serde_json::from_str(out.trim_end()).unwrap();
        assert_eq!(value["fields"]["env"], "prod");
    }

    #[tokio::test]
    async fn test_raw_output() {
        let out = write_all(vec![entry("hello"), entry("world")], OutputFormat::Raw).await;
        assert_eq!(out, "hello\nworld\n");
    }

    #[tokio::test]
    async fn test_timer_flushes_without_close() {
        let (tx, rx) = mpsc::channel(8);
        let (sink, mut reader) = tokio::io::duplex(4096);
        let writer = OutputWriter::new(sink, OutputFormat::Raw)
            .with_flush_interval(Duration::from_millis(50));
        let handle = tokio::spawn(writer.run(rx));

        tx.send(entry("buffered")).await.unwrap();
        let mut buf = vec![0u8; 9];
        tokio::time::timeout(
            Duration::from_secs(2),
            tokio::io::AsyncReadExt::read_exact(&mut reader, &mut buf),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(&buf, b"buffered\n");

        drop(tx);
        handle.await.unwrap();
    }

    /// Sink that rejects every other write
    struct FlakySink {
        written: Vec<u8>,
        calls: usize,
    }

    impl AsyncWrite for FlakySink {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            self.calls += 1;
            if self.calls % 2 == 1 {
                return Poll::Ready(Err(io::Error::other("sink unavailable")));
            }
            self.written.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_write_failure_does_not_stop_writer() {
        let (tx, rx) = mpsc::channel(8);
        let sink = FlakySink {
            written: Vec::new(),
            calls: 0,
        };
        // A capacity-less buffer sends every write straight to the sink
        let writer = OutputWriter {
            sink: BufWriter::with_capacity(0, sink),
            format: OutputFormat::Raw,
            flush_interval: Duration::from_secs(60),
        };
        let handle = tokio::spawn(writer.run(rx));

        tx.send(entry("lost")).await.unwrap();
        tx.send(entry("kept")).await.unwrap();
        drop(tx);

        let sink = handle.await.unwrap();
        assert_eq!(String::from_utf8(sink.written).unwrap(), "kept\n");
    }
}
