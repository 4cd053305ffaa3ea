//! Core types and events for archive-harvest

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One entry of the input list.
///
/// The identifier is resolved once when the target is created and never changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Source URL exactly as it appeared in the input
    pub raw_url: String,
    /// Resource token extracted from the URL, absent when the URL does not match
    pub identifier: Option<String>,
}

impl Target {
    /// Build a target from a raw URL with an already-resolved identifier
    pub fn new(raw_url: impl Into<String>, identifier: Option<String>) -> Self {
        Self {
            raw_url: raw_url.into(),
            identifier,
        }
    }

    /// Identifier for log lines, `-` when absent
    pub fn label(&self) -> &str {
        self.identifier.as_deref().unwrap_or("-")
    }
}

/// A single size observation of a finished artifact
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeSample {
    /// Time since the attempt started
    pub offset: Duration,
    /// Observed size in bytes
    pub bytes: u64,
}

/// Non-terminal phases of an attempt, in pipeline order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Created, nothing done yet
    Pending,
    /// Driving the session to the landing page and the direct artifact URL
    Navigating,
    /// Inspecting the resulting page for block/paywall/auth indicators
    BlockDetection,
    /// Waiting for a partial or finished artifact to appear
    AwaitingStart,
    /// Waiting for the finished artifact to replace the partial one
    Transferring,
    /// Sampling the finished artifact's size until it is stable
    StabilityCheck,
}

/// Terminal outcome of an attempt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Artifact written and size-stable
    Complete {
        /// Final artifact size
        size_bytes: u64,
    },
    /// Artifact was already present before the attempt started
    Skipped,
    /// The page matched a block/paywall/auth indicator
    Blocked {
        /// The indicator that matched
        indicator: String,
    },
    /// No artifact appeared within the start window
    NoStart,
    /// The artifact never became complete and stable within the completion window
    Timeout,
    /// No identifier could be extracted from the source URL
    ResolutionFailed,
    /// The automation session faulted during the attempt
    AgentError {
        /// Description of the fault
        message: String,
    },
}

/// Aggregation class of a terminal outcome
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeClass {
    /// Counted in `RunSummary::successful`
    Successful,
    /// Counted in `RunSummary::failed`
    Failed,
}

impl Outcome {
    /// Map the outcome onto its aggregation class
    pub fn class(&self) -> OutcomeClass {
        match self {
            Outcome::Complete { .. } | Outcome::Skipped => OutcomeClass::Successful,
            Outcome::Blocked { .. }
            | Outcome::NoStart
            | Outcome::Timeout
            | Outcome::ResolutionFailed
            | Outcome::AgentError { .. } => OutcomeClass::Failed,
        }
    }

    /// Whether the session used for this attempt must be replaced before the next one
    pub fn requires_recycle(&self) -> bool {
        matches!(self, Outcome::AgentError { .. })
    }

    /// Short machine-friendly name
    pub fn name(&self) -> &'static str {
        match self {
            Outcome::Complete { .. } => "complete",
            Outcome::Skipped => "skipped",
            Outcome::Blocked { .. } => "blocked",
            Outcome::NoStart => "no_start",
            Outcome::Timeout => "timeout",
            Outcome::ResolutionFailed => "resolution_failed",
            Outcome::AgentError { .. } => "agent_error",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Complete { size_bytes } => write!(
                f,
                "download complete ({:.1} MB)",
                *size_bytes as f64 / (1024.0 * 1024.0)
            ),
            Outcome::Skipped => write!(f, "already exists"),
            Outcome::Blocked { indicator } => write!(
                f,
                "link not directly downloadable (page matched \"{}\")",
                indicator
            ),
            Outcome::NoStart => write!(f, "download did not start"),
            Outcome::Timeout => write!(f, "download timeout"),
            Outcome::ResolutionFailed => write!(f, "no identifier in source URL"),
            Outcome::AgentError { message } => write!(f, "agent error: {}", message),
        }
    }
}

/// State of an attempt: either still moving through the pipeline or finished
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    /// In progress
    Active(Phase),
    /// Finished; never changes afterwards
    Terminal(Outcome),
}

impl AttemptState {
    /// Whether the attempt has reached a terminal outcome
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptState::Terminal(_))
    }
}

/// Final record of one attempt, produced when the attempt reaches its terminal state
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptReport {
    /// 1-based position of the target in the input list
    pub index: usize,
    /// The target that was processed
    pub target: Target,
    /// Terminal outcome
    pub outcome: Outcome,
    /// Phases passed through, in order, starting with `Pending`
    pub phases: Vec<Phase>,
    /// Human-readable reason for failed outcomes
    pub failure_reason: Option<String>,
    /// Size observations taken during the stability check
    pub size_samples: Vec<SizeSample>,
    /// Wall time spent on the attempt
    pub elapsed: Duration,
}

impl AttemptReport {
    /// Aggregation class of the outcome
    pub fn class(&self) -> OutcomeClass {
        self.outcome.class()
    }

    /// The sealed terminal state
    pub fn state(&self) -> AttemptState {
        AttemptState::Terminal(self.outcome.clone())
    }
}

/// Run counters, folded from attempt reports
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Attempts processed
    pub total: usize,
    /// Attempts classified successful (complete or skipped)
    pub successful: usize,
    /// Attempts classified failed
    pub failed: usize,
}

impl RunSummary {
    /// Fold one finished attempt into the counters
    #[must_use]
    pub fn record(self, class: OutcomeClass) -> Self {
        match class {
            OutcomeClass::Successful => Self {
                total: self.total + 1,
                successful: self.successful + 1,
                ..self
            },
            OutcomeClass::Failed => Self {
                total: self.total + 1,
                failed: self.failed + 1,
                ..self
            },
        }
    }
}

/// Why a session was replaced
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecycleReason {
    /// The session served its configured number of attempts
    Cadence,
    /// The previous attempt ended in an agent fault
    AgentFault,
}

/// Events emitted by the batch orchestrator
///
/// Subscribe via [`BatchOrchestrator::subscribe`](crate::orchestrator::BatchOrchestrator::subscribe).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The run is about to process its first target
    RunStarted {
        /// Number of targets in the input
        total: usize,
    },

    /// An attempt is starting
    AttemptStarted {
        /// 1-based position in the input
        index: usize,
        /// Number of targets in the input
        total: usize,
        /// Resolved identifier, if any
        identifier: Option<String>,
    },

    /// An attempt reached its terminal state
    AttemptFinished {
        /// The attempt's final record
        report: Box<AttemptReport>,
    },

    /// The session was torn down and replaced
    SessionRecycled {
        /// Why the session was replaced
        reason: RecycleReason,
    },

    /// All targets were processed
    RunFinished {
        /// Final counters
        summary: RunSummary,
    },
}
