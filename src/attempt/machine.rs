//! Attempt state machine -- one target, one pass, one terminal outcome.

use super::context::AttemptContext;
use crate::agent::AutomationAgent;
use crate::error::AgentError;
use crate::observer::{Completion, SampleLog};
use crate::pacing::sleep_random;
use crate::types::{AttemptReport, AttemptState, Outcome, OutcomeClass, Phase, Target};
use tokio::time::Instant;

/// An attempt that has not yet reached its terminal outcome.
///
/// Finishing consumes the attempt, so a terminal outcome cannot be changed
/// or followed by further phases.
#[derive(Debug)]
pub struct Attempt {
    index: usize,
    target: Target,
    phases: Vec<Phase>,
    started: Instant,
}

impl Attempt {
    /// Create a pending attempt for the `index`-th target (1-based)
    pub fn new(index: usize, target: Target) -> Self {
        Self {
            index,
            target,
            phases: vec![Phase::Pending],
            started: Instant::now(),
        }
    }

    /// Current state; always active until [`finish`](Self::finish)
    pub fn state(&self) -> AttemptState {
        AttemptState::Active(self.phase())
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phases.last().copied().unwrap_or(Phase::Pending)
    }

    /// The target being processed
    pub fn target(&self) -> &Target {
        &self.target
    }

    fn advance(&mut self, phase: Phase) {
        tracing::debug!(
            index = self.index,
            identifier = self.target.label(),
            from = ?self.phase(),
            to = ?phase,
            "Attempt phase"
        );
        self.phases.push(phase);
    }

    /// Seal the attempt with its terminal outcome
    pub fn finish(self, outcome: Outcome, log: SampleLog) -> AttemptReport {
        let failure_reason = match outcome.class() {
            OutcomeClass::Failed => Some(outcome.to_string()),
            OutcomeClass::Successful => None,
        };
        AttemptReport {
            index: self.index,
            target: self.target,
            outcome,
            phases: self.phases,
            failure_reason,
            size_samples: log.into_samples(),
            elapsed: self.started.elapsed(),
        }
    }
}

/// Drive one target to its terminal outcome using `agent`.
///
/// Phases:
/// 1. Resolution: no identifier means nothing to fetch
/// 2. Skip check: a finished artifact already on disk short-circuits everything
/// 3. Navigation: landing page, random settle, direct artifact URL, fixed pause
/// 4. Block detection: an auth or paywall page ends the attempt immediately
/// 5. Start wait, transfer wait, stability check
///
/// Agent faults that lose the session end the attempt as [`Outcome::AgentError`].
/// Other agent faults are logged and the pipeline continues, since the
/// filesystem remains the authority on whether a download happened.
pub async fn run_attempt(
    ctx: &AttemptContext,
    agent: &dyn AutomationAgent,
    index: usize,
    target: Target,
) -> AttemptReport {
    let mut attempt = Attempt::new(index, target);
    let mut log = SampleLog::new(attempt.started);

    let outcome = drive(ctx, agent, &mut attempt, &mut log).await;

    match outcome.class() {
        OutcomeClass::Successful => tracing::info!(
            index,
            identifier = attempt.target.label(),
            outcome = outcome.name(),
            "{outcome}"
        ),
        OutcomeClass::Failed => tracing::warn!(
            index,
            identifier = attempt.target.label(),
            outcome = outcome.name(),
            phase = ?attempt.phase(),
            "{outcome}"
        ),
    }

    attempt.finish(outcome, log)
}

async fn drive(
    ctx: &AttemptContext,
    agent: &dyn AutomationAgent,
    attempt: &mut Attempt,
    log: &mut SampleLog,
) -> Outcome {
    let timing = &ctx.timing;

    // Phase 1: Resolution
    let Some(identifier) = attempt.target.identifier.clone() else {
        return Outcome::ResolutionFailed;
    };

    // Phase 2: Skip if already downloaded
    if ctx.observer.has_existing(&identifier) {
        return Outcome::Skipped;
    }

    // Phase 3: Navigation
    attempt.advance(Phase::Navigating);
    let landing = attempt.target.raw_url.clone();
    if let Err(outcome) = navigate(agent, &landing).await {
        return outcome;
    }
    sleep_random(timing.settle_min, timing.settle_max).await;

    let artifact_url = ctx.target.artifact_url(&identifier);
    if let Err(outcome) = navigate(agent, &artifact_url).await {
        return outcome;
    }
    tokio::time::sleep(timing.post_navigation_delay).await;

    // Phase 4: Block detection
    attempt.advance(Phase::BlockDetection);
    match read_page(agent).await {
        Ok((title, content)) => {
            if let Some(indicator) = ctx.detector.detect(&title, &content) {
                return Outcome::Blocked {
                    indicator: indicator.to_string(),
                };
            }
        }
        Err(e) if e.is_session_fatal() => return agent_error(e),
        // PDF responses often leave nothing readable; the directory decides
        Err(e) => {
            tracing::debug!(identifier = %identifier, error = %e, "Page not readable, skipping block check");
        }
    }

    // Phase 5: Start detection
    attempt.advance(Phase::AwaitingStart);
    if !ctx
        .observer
        .await_start(&identifier, timing.start_timeout)
        .await
    {
        return Outcome::NoStart;
    }

    // Phase 6: Transfer and stability share one completion bound
    let deadline = Instant::now() + timing.completion_timeout;

    attempt.advance(Phase::Transferring);
    if !ctx.observer.await_finished(&identifier, deadline).await {
        return Outcome::Timeout;
    }

    attempt.advance(Phase::StabilityCheck);
    match ctx
        .observer
        .await_stable_until(&identifier, deadline, log)
        .await
    {
        Completion::Complete { size_bytes } => Outcome::Complete { size_bytes },
        Completion::TimedOut => Outcome::Timeout,
    }
}

/// Navigate, mapping session-losing faults to a terminal outcome
async fn navigate(agent: &dyn AutomationAgent, url: &str) -> Result<(), Outcome> {
    match agent.navigate(url).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_session_fatal() => Err(agent_error(e)),
        // Download URLs routinely abort the page load; the session is still fine
        Err(e) => {
            tracing::debug!(url, error = %e, "Navigation reported an error, continuing");
            Ok(())
        }
    }
}

async fn read_page(agent: &dyn AutomationAgent) -> Result<(String, String), AgentError> {
    let title = agent.current_title().await?;
    let content = agent.current_content().await?;
    Ok((title, content))
}

fn agent_error(e: AgentError) -> Outcome {
    Outcome::AgentError {
        message: e.to_string(),
    }
}
