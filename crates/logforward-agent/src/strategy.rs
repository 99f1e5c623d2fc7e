use std::path::PathBuf;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use logforward_tail::{LogEntry, OutputFormat, OutputWriter, TailContext, Tailer};

/// Starts the per-file task for a newly discovered path.
///
/// The returned future runs until `cancel` fires or the file can no longer
/// be read; its completion is the tailer's completion signal.
pub trait TailStrategy: Send + Sync {
    fn tail(
        &self,
        path: PathBuf,
        ctx: TailContext,
        out: mpsc::Sender<LogEntry>,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, ()>;
}

/// Consumes the shared queue until it is closed
pub trait WriteStrategy: Send + Sync {
    fn write(&self, rx: mpsc::Receiver<LogEntry>, format: OutputFormat) -> BoxFuture<'static, ()>;
}

/// Tails real files with [`Tailer`]
#[derive(Clone, Copy, Debug, Default)]
pub struct FileTailer;

impl TailStrategy for FileTailer {
    fn tail(
        &self,
        path: PathBuf,
        ctx: TailContext,
        out: mpsc::Sender<LogEntry>,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, ()> {
        Tailer::new(path, ctx, out, cancel).run().boxed()
    }
}

/// Writes entries to the process stdout
#[derive(Clone, Copy, Debug, Default)]
pub struct StdoutWriter;

impl WriteStrategy for StdoutWriter {
    fn write(&self, rx: mpsc::Receiver<LogEntry>, format: OutputFormat) -> BoxFuture<'static, ()> {
        async move {
            OutputWriter::new(tokio::io::stdout(), format).run(rx).await;
        }
        .boxed()
    }
}
