//! Artifact observation through filesystem side effects
//!
//! The browser writes downloads on its own and reports nothing back, so the
//! only evidence of progress is the download directory itself:
//! - a partial artifact (`*{id}*.crdownload`) means a transfer is running
//! - a finished artifact (`*{id}.pdf`) means the browser renamed it into place
//! - a finished artifact whose size holds still across spaced samples is complete
//!
//! All waits run on tokio's clock, so tests drive them with a paused runtime.

use crate::config::{ArtifactConfig, TimingConfig};
use crate::types::SizeSample;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// What the download directory currently holds for one identifier
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArtifactScan {
    /// Size of the finished artifact, if one exists
    pub finished: Option<u64>,
    /// Whether an in-progress artifact exists
    pub partial: bool,
}

/// Read-only view of the download directory.
///
/// Implementations must tolerate files appearing and vanishing between calls;
/// a scan that races with the browser simply reports what it saw.
pub trait ArtifactProbe: Send + Sync {
    /// Scan for artifacts belonging to `identifier`
    fn scan(&self, identifier: &str) -> ArtifactScan;

    /// Number of in-progress artifacts in the whole directory
    fn partial_count(&self) -> usize;
}

/// [`ArtifactProbe`] backed by a real directory
#[derive(Clone, Debug)]
pub struct DirectoryProbe {
    dir: PathBuf,
    finished_suffix: String,
    partial_suffix: String,
}

impl DirectoryProbe {
    /// Watch `dir` using the naming convention in `artifacts`
    pub fn new(dir: impl Into<PathBuf>, artifacts: &ArtifactConfig) -> Self {
        Self {
            dir: dir.into(),
            finished_suffix: format!(".{}", artifacts.extension),
            partial_suffix: format!(".{}", artifacts.partial_extension),
        }
    }

    /// Directory being observed
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File names in the directory, sorted; unreadable directories read as empty
    fn file_names(&self) -> Vec<String> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), error = %e, "Cannot read download directory");
                return Vec::new();
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();
        names
    }
}

impl ArtifactProbe for DirectoryProbe {
    fn scan(&self, identifier: &str) -> ArtifactScan {
        let finished_name = format!("{identifier}{}", self.finished_suffix);
        let mut scan = ArtifactScan::default();

        for name in self.file_names() {
            if name.ends_with(&self.partial_suffix) && name.contains(identifier) {
                scan.partial = true;
            } else if scan.finished.is_none() && name.ends_with(&finished_name) {
                // Vanished between listing and stat: treat as not there yet
                if let Ok(meta) = std::fs::metadata(self.dir.join(&name)) {
                    scan.finished = Some(meta.len());
                }
            }
        }

        scan
    }

    fn partial_count(&self) -> usize {
        self.file_names()
            .iter()
            .filter(|name| name.ends_with(&self.partial_suffix))
            .count()
    }
}

/// Result of waiting for a stable finished artifact
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    /// The artifact exists and its size held still across the confirmation samples
    Complete {
        /// Confirmed size
        size_bytes: u64,
    },
    /// The bound elapsed first
    TimedOut,
}

/// Accumulates size samples relative to an attempt's start
#[derive(Debug)]
pub struct SampleLog {
    origin: Instant,
    samples: Vec<SizeSample>,
}

impl SampleLog {
    /// Start a log whose offsets are measured from `origin`
    pub fn new(origin: Instant) -> Self {
        Self {
            origin,
            samples: Vec::new(),
        }
    }

    fn push(&mut self, bytes: u64) {
        self.samples.push(SizeSample {
            offset: self.origin.elapsed(),
            bytes,
        });
    }

    /// Samples recorded so far
    pub fn samples(&self) -> &[SizeSample] {
        &self.samples
    }

    /// Consume the log
    pub fn into_samples(self) -> Vec<SizeSample> {
        self.samples
    }
}

/// Poll intervals and thresholds used by [`ArtifactObserver`]
#[derive(Clone, Debug)]
pub struct ObserverTiming {
    /// Poll interval while waiting for a start
    pub start_poll_interval: Duration,
    /// Poll interval while waiting for completion
    pub completion_poll_interval: Duration,
    /// Gap between confirmation samples
    pub stability_cooldown: Duration,
    /// Poll interval of the end-of-run settle wait
    pub settle_poll_interval: Duration,
    /// Minimum size of a finished artifact that can be complete
    pub min_complete_bytes: u64,
}

impl ObserverTiming {
    /// Take the relevant settings from the run configuration
    pub fn from_config(timing: &TimingConfig, artifacts: &ArtifactConfig) -> Self {
        Self {
            start_poll_interval: timing.start_poll_interval,
            completion_poll_interval: timing.completion_poll_interval,
            stability_cooldown: timing.stability_cooldown,
            settle_poll_interval: timing.settle_poll_interval,
            min_complete_bytes: artifacts.min_complete_bytes,
        }
    }
}

/// Infers transfer start and completion from an [`ArtifactProbe`]
#[derive(Clone)]
pub struct ArtifactObserver {
    probe: Arc<dyn ArtifactProbe>,
    timing: ObserverTiming,
}

impl ArtifactObserver {
    /// Create an observer over `probe`
    pub fn new(probe: Arc<dyn ArtifactProbe>, timing: ObserverTiming) -> Self {
        Self { probe, timing }
    }

    /// Whether a finished artifact for `identifier` already exists
    pub fn has_existing(&self, identifier: &str) -> bool {
        self.probe.scan(identifier).finished.is_some()
    }

    /// Whether an in-progress artifact for `identifier` exists
    pub fn has_partial(&self, identifier: &str) -> bool {
        self.probe.scan(identifier).partial
    }

    /// Poll until a partial or finished artifact appears, or `timeout` elapses
    pub async fn await_start(&self, identifier: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let scan = self.probe.scan(identifier);
            if scan.partial || scan.finished.is_some() {
                tracing::debug!(identifier, "Transfer start observed");
                return true;
            }
            if !sleep_within(self.timing.start_poll_interval, deadline).await {
                return false;
            }
        }
    }

    /// Poll until the finished artifact exists, or `deadline` passes
    pub async fn await_finished(&self, identifier: &str, deadline: Instant) -> bool {
        loop {
            if self.probe.scan(identifier).finished.is_some() {
                return true;
            }
            if !sleep_within(self.timing.completion_poll_interval, deadline).await {
                return false;
            }
        }
    }

    /// Poll until the finished artifact is complete and size-stable, or `timeout` elapses
    pub async fn await_stable_completion(
        &self,
        identifier: &str,
        timeout: Duration,
        log: &mut SampleLog,
    ) -> Completion {
        self.await_stable_until(identifier, Instant::now() + timeout, log)
            .await
    }

    /// Deadline-based form of [`await_stable_completion`](Self::await_stable_completion).
    ///
    /// A finished artifact counts as complete once it is at least
    /// `min_complete_bytes` and three samples, each one cooldown apart, agree.
    /// Any disagreement restarts the confirmation after a poll interval.
    pub async fn await_stable_until(
        &self,
        identifier: &str,
        deadline: Instant,
        log: &mut SampleLog,
    ) -> Completion {
        let cooldown = self.timing.stability_cooldown;

        loop {
            if Instant::now() >= deadline {
                return Completion::TimedOut;
            }

            let first = self
                .sample(identifier, log)
                .filter(|size| *size >= self.timing.min_complete_bytes);

            if let Some(first) = first {
                if !sleep_within(cooldown, deadline).await {
                    return Completion::TimedOut;
                }
                if self.sample(identifier, log) == Some(first) {
                    if !sleep_within(cooldown, deadline).await {
                        return Completion::TimedOut;
                    }
                    if self.sample(identifier, log) == Some(first) {
                        return Completion::Complete { size_bytes: first };
                    }
                }
                tracing::debug!(identifier, size = first, "Artifact still growing");
            }

            if !sleep_within(self.timing.completion_poll_interval, deadline).await {
                return Completion::TimedOut;
            }
        }
    }

    /// Wait until no partial artifact remains anywhere in the directory
    pub async fn await_settled(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let pending = self.probe.partial_count();
            if pending == 0 {
                return true;
            }
            tracing::debug!(pending, "Waiting for in-flight downloads");
            if !sleep_within(self.timing.settle_poll_interval, deadline).await {
                return false;
            }
        }
    }

    fn sample(&self, identifier: &str, log: &mut SampleLog) -> Option<u64> {
        let size = self.probe.scan(identifier).finished;
        if let Some(bytes) = size {
            log.push(bytes);
        }
        size
    }
}

/// Sleep for `duration` unless that would overshoot `deadline`.
///
/// Returns `false` (after sleeping up to the deadline) when the bound is hit.
async fn sleep_within(duration: Duration, deadline: Instant) -> bool {
    let now = Instant::now();
    if now + duration > deadline {
        tokio::time::sleep_until(deadline).await;
        false
    } else {
        tokio::time::sleep(duration).await;
        true
    }
}
