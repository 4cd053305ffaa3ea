//! Automation session lifecycle
//!
//! The [`SessionManager`] exclusively owns the one live browser session.
//! Attempts borrow its agent for their duration; between attempts the manager
//! decides, from the run-wide attempt index, whether the session is replaced.
//!
//! Teardown is best effort: a crashed or hung browser must never block its own
//! replacement. Provisioning is not: if no replacement can be created the
//! error is returned to the caller.

use crate::agent::{AgentProvisioner, AutomationAgent, SessionSettings};
use crate::config::SessionConfig;
use crate::error::AgentError;
use crate::types::RecycleReason;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on a single teardown
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// One provisioned agent plus its bookkeeping
pub struct Session {
    agent: Box<dyn AutomationAgent>,
    attempts_served: usize,
    created_at: DateTime<Utc>,
}

impl Session {
    fn new(agent: Box<dyn AutomationAgent>) -> Self {
        Self {
            agent,
            attempts_served: 0,
            created_at: Utc::now(),
        }
    }

    /// The agent driving this session
    pub fn agent(&self) -> &dyn AutomationAgent {
        self.agent.as_ref()
    }

    /// Attempts processed while this session was current
    pub fn attempts_served(&self) -> usize {
        self.attempts_served
    }

    /// When the session was provisioned
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// When and how sessions are replaced
#[derive(Clone, Debug)]
pub struct RecyclePolicy {
    /// Attempts a session serves before proactive replacement
    pub cadence: usize,
    /// Pause between teardown and re-provisioning
    pub restart_pause: Duration,
}

impl RecyclePolicy {
    /// Take the policy from the session configuration
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            cadence: config.recycle_after.max(1),
            restart_pause: config.restart_pause,
        }
    }
}

/// Owns the current session and replaces it on schedule or after faults
pub struct SessionManager {
    provisioner: Arc<dyn AgentProvisioner>,
    settings: SessionSettings,
    policy: RecyclePolicy,
    current: Option<Session>,
    provisioned: usize,
    recycles: usize,
}

impl SessionManager {
    /// Create a manager; no session exists until [`acquire`](Self::acquire)
    pub fn new(
        provisioner: Arc<dyn AgentProvisioner>,
        settings: SessionSettings,
        policy: RecyclePolicy,
    ) -> Self {
        Self {
            provisioner,
            settings,
            policy,
            current: None,
            provisioned: 0,
            recycles: 0,
        }
    }

    /// Provision the first session, replacing any existing one
    pub async fn acquire(&mut self) -> Result<&Session, AgentError> {
        if let Some(old) = self.current.take() {
            teardown(old).await;
        }
        let agent = self.provisioner.provision(&self.settings).await?;
        self.provisioned += 1;
        tracing::info!(
            provisioner = self.provisioner.name(),
            generation = self.provisioned,
            "Automation session ready"
        );
        Ok(self.current.insert(Session::new(agent)))
    }

    /// Tear the current session down (best effort) and provision a replacement
    pub async fn recycle(&mut self, reason: RecycleReason) -> Result<&Session, AgentError> {
        tracing::info!(
            reason = ?reason,
            attempts_served = self.current.as_ref().map(Session::attempts_served),
            "Recycling automation session"
        );
        if let Some(old) = self.current.take() {
            teardown(old).await;
        }
        tokio::time::sleep(self.policy.restart_pause).await;

        self.recycles += 1;
        self.acquire().await
    }

    /// The live session, if any
    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// Count one processed attempt against the current session
    pub fn note_attempt(&mut self) {
        if let Some(session) = self.current.as_mut() {
            session.attempts_served += 1;
        }
    }

    /// Whether a proactive recycle is scheduled before the 1-based attempt `index`
    ///
    /// The schedule is run-wide: replacements land before attempts
    /// `cadence + 1`, `2 * cadence + 1`, ... regardless of any fault recycles
    /// in between.
    pub fn due_for_recycle_at(&self, index: usize) -> bool {
        index > 1 && (index - 1) % self.policy.cadence == 0
    }

    /// Tear down the current session at run end
    pub async fn release(&mut self) {
        if let Some(session) = self.current.take() {
            teardown(session).await;
            tracing::info!("Automation session released");
        }
    }

    /// Sessions provisioned so far, including the first
    pub fn sessions_provisioned(&self) -> usize {
        self.provisioned
    }

    /// Recycles performed so far
    pub fn recycle_count(&self) -> usize {
        self.recycles
    }
}

async fn teardown(session: Session) {
    match tokio::time::timeout(TEARDOWN_TIMEOUT, session.agent.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Session teardown failed, continuing");
        }
        Err(_) => {
            tracing::warn!(timeout = ?TEARDOWN_TIMEOUT, "Session teardown timed out, continuing");
        }
    }
}
