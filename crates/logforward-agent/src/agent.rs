use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use logforward_tail::{CompiledTarget, LogEntry, Metrics, NoopMetrics, RegexCache, TailContext};
use logforward_types::{ConfigError, Settings};

use crate::discovery;
use crate::strategy::{FileTailer, StdoutWriter, TailStrategy, WriteStrategy};

/// Capacity of the queue between tailers and the writer
pub const QUEUE_CAPACITY: usize = 100;

/// A live tailer for one path
struct TrackedFile {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Discovery and supervision loop.
///
/// Owns the tracked-file map exclusively; tailers never touch it.
pub struct Agent {
    settings: Settings,
    regexes: RegexCache,
    hostname: Arc<str>,
    metrics: Arc<dyn Metrics>,
    tailer: Arc<dyn TailStrategy>,
    writer: Arc<dyn WriteStrategy>,
    tracked: HashMap<PathBuf, TrackedFile>,
    /// Cancelled tailers that may still be draining; their paths are not
    /// restarted until they finish.
    stopping: HashMap<PathBuf, JoinHandle<()>>,
    queue_capacity: usize,
}

impl Agent {
    /// Build an agent, compiling every target's patterns up front
    pub fn new(settings: Settings, hostname: impl Into<String>) -> Result<Self, ConfigError> {
        let regexes = RegexCache::compile(&settings.targets)?;
        let hostname: String = hostname.into();

        Ok(Self {
            settings,
            regexes,
            hostname: Arc::from(hostname),
            metrics: Arc::new(NoopMetrics),
            tailer: Arc::new(FileTailer),
            writer: Arc::new(StdoutWriter),
            tracked: HashMap::new(),
            stopping: HashMap::new(),
            queue_capacity: QUEUE_CAPACITY,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_tailer(mut self, tailer: Arc<dyn TailStrategy>) -> Self {
        self.tailer = tailer;
        self
    }

    pub fn with_writer(mut self, writer: Arc<dyn WriteStrategy>) -> Self {
        self.writer = writer;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Paths with a live (or not yet reaped) tailer
    pub fn tracked_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.tracked.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Run discovery cycles until `shutdown` fires, then stop every tailer,
    /// close the queue and wait for the writer's final flush.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let writer = tokio::spawn(self.writer.write(rx, self.settings.output_format));

        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            targets = self.settings.targets.len(),
            poll_interval = ?self.settings.poll_interval,
            format = self.settings.output_format.as_str(),
            "log collector started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.discover(&tx, &shutdown),
            }
        }

        info!("shutdown signal received, cleaning up");
        self.stop_all().await;

        drop(tx);
        if let Err(err) = writer.await {
            warn!(error = %err, "output writer task failed");
        }
        info!("all collectors stopped");
    }

    /// One discovery cycle: reap, expand, start new tailers, stop stale ones
    pub fn discover(&mut self, out: &mpsc::Sender<LogEntry>, shutdown: &CancellationToken) {
        self.reap_finished();

        let mut active = HashSet::new();
        let mut new_paths: Vec<(PathBuf, Arc<CompiledTarget>)> = Vec::new();

        for (index, target) in self.settings.targets.iter().enumerate() {
            let Some(compiled) = self.regexes.get(index) else {
                continue;
            };

            for pattern in &target.paths {
                let matches = match discovery::expand(pattern) {
                    Ok(matches) => matches,
                    Err(err) => {
                        warn!(target_name = %target.name, pattern = %pattern, error = %err, "invalid glob pattern");
                        continue;
                    }
                };

                for path in matches {
                    if !active.insert(path.clone()) {
                        continue;
                    }
                    if !self.tracked.contains_key(&path) && !self.stopping.contains_key(&path) {
                        new_paths.push((path, Arc::clone(compiled)));
                    }
                }
            }
        }

        for (path, target) in new_paths {
            self.start_tailer(path, target, out, shutdown);
        }

        let stale: Vec<PathBuf> = self
            .tracked
            .keys()
            .filter(|path| !active.contains(*path))
            .cloned()
            .collect();
        for path in stale {
            if let Some(tracked) = self.tracked.remove(&path) {
                tracked.cancel.cancel();
                info!(path = %path.display(), "stopped tracking");
                self.stopping.insert(path, tracked.handle);
            }
        }
    }

    fn start_tailer(
        &mut self,
        path: PathBuf,
        target: Arc<CompiledTarget>,
        out: &mpsc::Sender<LogEntry>,
        shutdown: &CancellationToken,
    ) {
        let cancel = shutdown.child_token();
        let ctx = TailContext {
            target,
            hostname: Arc::clone(&self.hostname),
            metrics: Arc::clone(&self.metrics),
        };

        let task = self
            .tailer
            .tail(path.clone(), ctx, out.clone(), cancel.clone());
        let handle = tokio::spawn(task);

        info!(path = %path.display(), "started tracking");
        self.tracked.insert(path, TrackedFile { cancel, handle });
    }

    /// Forget tailers that have ended so their paths can be retried
    fn reap_finished(&mut self) {
        self.tracked.retain(|path, tracked| {
            if tracked.handle.is_finished() {
                debug!(path = %path.display(), "tailer ended, path eligible for restart");
                return false;
            }
            true
        });
        self.stopping.retain(|_, handle| !handle.is_finished());
    }

    async fn stop_all(&mut self) {
        for tracked in self.tracked.values() {
            tracked.cancel.cancel();
        }

        let (paths, handles): (Vec<PathBuf>, Vec<JoinHandle<()>>) = self
            .tracked
            .drain()
            .map(|(path, tracked)| (path, tracked.handle))
            .chain(self.stopping.drain())
            .unzip();

        for (path, result) in paths.iter().zip(join_all(handles).await) {
            if let Err(err) = result {
                warn!(path = %path.display(), error = %err, "tailer task failed");
            }
        }
    }

    pub fn is_tracking(&self, path: &Path) -> bool {
        self.tracked.contains_key(path)
    }

    /// Whether a cancelled tailer for `path` has not finished yet
    pub fn is_stopping(&self, path: &Path) -> bool {
        self.stopping.contains_key(path)
    }
}
