//! Batch orchestration -- sequential attempts over one shared session.

use crate::agent::{AgentProvisioner, SessionSettings};
use crate::attempt::{Attempt, AttemptContext, run_attempt};
use crate::config::{Config, PacingConfig};
use crate::error::{Error, Result};
use crate::observer::{ArtifactObserver, DirectoryProbe, ObserverTiming, SampleLog};
use crate::pacing::sleep_random;
use crate::session::{RecyclePolicy, SessionManager};
use crate::types::{Event, Outcome, RecycleReason, RunSummary, Target};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Capacity of the event channel; slow subscribers lag rather than block the run
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Runs a target list to completion, one attempt at a time
pub struct BatchOrchestrator {
    sessions: SessionManager,
    ctx: AttemptContext,
    pacing: PacingConfig,
    settle_timeout: Duration,
    shutdown_grace: Duration,
    event_tx: broadcast::Sender<Event>,
}

impl BatchOrchestrator {
    /// Create an orchestrator; no session is provisioned until [`run`](Self::run)
    pub fn new(sessions: SessionManager, ctx: AttemptContext, config: &Config) -> Self {
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            sessions,
            ctx,
            pacing: config.pacing.clone(),
            settle_timeout: config.timing.settle_timeout,
            shutdown_grace: config.session.shutdown_grace,
            event_tx,
        }
    }

    /// Wire an orchestrator over the configured download directory
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the download directory cannot be made absolute.
    pub fn from_config(config: &Config, provisioner: Arc<dyn AgentProvisioner>) -> Result<Self> {
        let settings = SessionSettings::from_config(config)?;
        let observer = ArtifactObserver::new(
            Arc::new(DirectoryProbe::new(
                settings.download_dir.clone(),
                &config.artifacts,
            )),
            ObserverTiming::from_config(&config.timing, &config.artifacts),
        );
        let sessions = SessionManager::new(
            provisioner,
            settings,
            RecyclePolicy::from_config(&config.session),
        );
        Ok(Self::new(
            sessions,
            AttemptContext::new(observer, config),
            config,
        ))
    }

    /// Subscribe to run events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The session manager, for inspecting provisioning counters
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Process `targets` in order and return the run's counters.
    ///
    /// Phases:
    /// 1. Provision the first session (failure is fatal)
    /// 2. Per target: recycle if the cadence is reached, run the attempt,
    ///    recycle immediately after an agent fault, pause before the next target
    /// 3. Wait (bounded) for in-flight downloads to settle
    /// 4. Release the session after the shutdown grace
    ///
    /// # Errors
    ///
    /// [`Error::Provision`] if the first session cannot be created,
    /// [`Error::SessionLost`] if a replacement cannot be created mid-run.
    pub async fn run(&mut self, targets: Vec<Target>) -> Result<RunSummary> {
        let total = targets.len();
        self.emit(Event::RunStarted { total });
        tracing::info!(total, "Starting batch run");

        let mut summary = RunSummary::default();
        if targets.is_empty() {
            tracing::info!("Nothing to download");
            self.emit(Event::RunFinished { summary });
            return Ok(summary);
        }

        // Phase 1: First session
        self.sessions.acquire().await.map_err(Error::Provision)?;

        // Phase 2: Attempts, strictly in input order
        for (position, target) in targets.into_iter().enumerate() {
            let index = position + 1;

            if self.sessions.due_for_recycle_at(index) {
                self.recycle(RecycleReason::Cadence, summary).await?;
            }

            tracing::info!(index, total, identifier = target.label(), "Processing target");
            self.emit(Event::AttemptStarted {
                index,
                total,
                identifier: target.identifier.clone(),
            });

            let report = match self.sessions.current() {
                Some(session) => run_attempt(&self.ctx, session.agent(), index, target).await,
                None => Attempt::new(index, target).finish(
                    Outcome::AgentError {
                        message: "no active session".to_string(),
                    },
                    SampleLog::new(Instant::now()),
                ),
            };
            self.sessions.note_attempt();
            summary = summary.record(report.class());

            let needs_recycle = report.outcome.requires_recycle();
            self.emit(Event::AttemptFinished {
                report: Box::new(report),
            });

            if needs_recycle {
                self.recycle(RecycleReason::AgentFault, summary).await?;
            }

            if index < total {
                sleep_random(self.pacing.delay_min, self.pacing.delay_max).await;
            }
        }

        // Phase 3: Let in-flight downloads land
        if !self.ctx.observer.await_settled(self.settle_timeout).await {
            tracing::warn!(
                timeout = ?self.settle_timeout,
                "Downloads still in progress at end of run"
            );
        }

        // Phase 4: Release
        tokio::time::sleep(self.shutdown_grace).await;
        self.sessions.release().await;

        tracing::info!(
            total = summary.total,
            successful = summary.successful,
            failed = summary.failed,
            "Batch run finished"
        );
        self.emit(Event::RunFinished { summary });
        Ok(summary)
    }

    async fn recycle(&mut self, reason: RecycleReason, summary: RunSummary) -> Result<()> {
        match self.sessions.recycle(reason).await {
            Ok(_) => {
                self.emit(Event::SessionRecycled { reason });
                Ok(())
            }
            Err(source) => {
                tracing::error!(error = %source, "Could not replace automation session");
                Err(Error::SessionLost { summary, source })
            }
        }
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }
}
