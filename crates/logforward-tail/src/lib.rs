//! File tailing and output for logforward
//!
//! This crate provides pattern compilation, per-file tailing across rotation
//! and truncation, multiline aggregation, and the output writer.

mod buffer;
mod filter;
mod identity;
mod metrics;
mod tailer;
mod writer;

pub use buffer::RecordBuffer;
pub use filter::{CompiledTarget, RegexCache};
pub use identity::{FileChange, FileIdentity};
pub use metrics::{CounterMetrics, FileErrorKind, Metrics, NoopMetrics};
pub use tailer::{DRAIN_TIMEOUT, EOF_BACKOFF, TailContext, Tailer};
pub use writer::{FLUSH_INTERVAL, OutputWriter, encode};

// Re-export types used in our public API
pub use logforward_types::{LogEntry, OutputFormat, Target};
