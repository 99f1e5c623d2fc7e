use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Kinds of per-file failures a tailer reports
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileErrorKind {
    Open,
    Read,
    Seek,
    SeekStart,
}

impl FileErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Read => "read",
            Self::Seek => "seek",
            Self::SeekStart => "seek_start",
        }
    }
}

/// Counter sink used by tailers; called concurrently from every tailer task
pub trait Metrics: Send + Sync {
    fn increment_lines_processed(&self, path: &str, group: &str);

    fn increment_file_error(&self, path: &str, kind: FileErrorKind);
}

/// Discards every increment
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn increment_lines_processed(&self, _path: &str, _group: &str) {}

    fn increment_file_error(&self, _path: &str, _kind: FileErrorKind) {}
}

/// In-memory counters, readable back for tests and embedding
#[derive(Debug, Default)]
pub struct CounterMetrics {
    lines: RwLock<HashMap<(String, String), AtomicU64>>,
    errors: RwLock<HashMap<(String, FileErrorKind), AtomicU64>>,
}

impl CounterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines_processed(&self, path: &str, group: &str) -> u64 {
        self.lines
            .read()
            .get(&(path.to_string(), group.to_string()))
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub fn file_errors(&self, path: &str, kind: FileErrorKind) -> u64 {
        self.errors
            .read()
            .get(&(path.to_string(), kind))
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Sum of lines processed across all paths and groups
    pub fn total_lines(&self) -> u64 {
        self.lines
            .read()
            .values()
            .map(|c| c.load(Ordering::SeqCst))
            .sum()
    }
}

impl Metrics for CounterMetrics {
    fn increment_lines_processed(&self, path: &str, group: &str) {
        let key = (path.to_string(), group.to_string());
        increment(&self.lines, key);
    }

    fn increment_file_error(&self, path: &str, kind: FileErrorKind) {
        increment(&self.errors, (path.to_string(), kind));
    }
}

fn increment<K: std::hash::Hash + Eq>(counters: &RwLock<HashMap<K, AtomicU64>>, key: K) {
    {
        let read = counters.read();
        if let Some(counter) = read.get(&key) {
            counter.fetch_add(1, Ordering::SeqCst);
            return;
        }
    }
    counters
        .write()
        .entry(key)
        .or_default()
        .fetch_add(1, Ordering::SeqCst);
}
