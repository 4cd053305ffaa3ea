//! Shared inputs of every attempt.

use super::detection::BlockDetector;
use crate::config::{Config, TargetConfig, TimingConfig};
use crate::observer::ArtifactObserver;

/// Everything an attempt needs besides the agent and the target itself.
///
/// Built once per run and reused for every attempt; cloning is cheap apart
/// from the indicator list.
#[derive(Clone)]
pub struct AttemptContext {
    /// Watches the download directory
    pub observer: ArtifactObserver,
    /// Recognizes block/paywall/auth pages
    pub detector: BlockDetector,
    /// Builds direct artifact URLs
    pub target: TargetConfig,
    /// Per-phase bounds
    pub timing: TimingConfig,
}

impl AttemptContext {
    /// Assemble the context from the run configuration
    pub fn new(observer: ArtifactObserver, config: &Config) -> Self {
        Self {
            observer,
            detector: BlockDetector::new(&config.block),
            target: config.target.clone(),
            timing: config.timing.clone(),
        }
    }
}
