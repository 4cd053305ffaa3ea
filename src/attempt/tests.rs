use super::*;
use crate::agent::AutomationAgent;
use crate::config::Config;
use crate::test_helpers::{
    Behavior, SimulatedBrowser, Simulation, directory_observer, gallica_target, test_config,
};
use crate::types::{AttemptState, Outcome, OutcomeClass, Phase, Target};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

struct Fixture {
    _dir: tempfile::TempDir,
    sim: Arc<Simulation>,
    config: Config,
    browser: SimulatedBrowser,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let sim = Simulation::new(dir.path());
    let config = test_config(dir.path());
    let browser = SimulatedBrowser::new(sim.clone());
    Fixture {
        _dir: dir,
        sim,
        config,
        browser,
    }
}

impl Fixture {
    fn ctx(&self) -> AttemptContext {
        AttemptContext::new(directory_observer(&self.config), &self.config)
    }

    async fn run(&self, target: Target) -> crate::types::AttemptReport {
        run_attempt(&self.ctx(), &self.browser, 1, target).await
    }
}

#[tokio::test(start_paused = true)]
async fn download_completes_through_every_phase() {
    let fx = fixture();
    fx.sim.set(
        "bpt6k100",
        Behavior::Download {
            bytes: 3 * 1024 * 1024,
            transfer: Duration::from_secs(20),
        },
    );

    let report = fx.run(gallica_target("bpt6k100")).await;

    assert_eq!(
        report.outcome,
        Outcome::Complete {
            size_bytes: 3 * 1024 * 1024
        }
    );
    assert_eq!(
        report.phases,
        vec![
            Phase::Pending,
            Phase::Navigating,
            Phase::BlockDetection,
            Phase::AwaitingStart,
            Phase::Transferring,
            Phase::StabilityCheck,
        ]
    );
    assert_eq!(report.failure_reason, None);
    assert_eq!(report.class(), OutcomeClass::Successful);
    assert!(report.size_samples.len() >= 3);
    assert!(report.state().is_terminal());
    assert_eq!(
        fx.sim.navigations(),
        vec![
            "https://gallica.bnf.fr/ark:/12148/bpt6k100".to_string(),
            "https://gallica.bnf.fr/ark:/12148/bpt6k100.pdf".to_string(),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn existing_artifact_is_skipped_without_navigation() {
    let fx = fixture();
    std::fs::write(fx.sim.dir.join("bpt6k7.pdf"), vec![1u8; 2048]).unwrap();

    let started = Instant::now();
    let report = fx.run(gallica_target("bpt6k7")).await;

    assert_eq!(report.outcome, Outcome::Skipped);
    assert_eq!(report.class(), OutcomeClass::Successful);
    assert_eq!(report.phases, vec![Phase::Pending]);
    assert!(fx.sim.navigations().is_empty());
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn unresolvable_target_fails_without_navigation() {
    let fx = fixture();

    let report = fx
        .run(Target::new("https://example.org/not-an-archive", None))
        .await;

    assert_eq!(report.outcome, Outcome::ResolutionFailed);
    assert_eq!(report.class(), OutcomeClass::Failed);
    assert!(report.failure_reason.is_some());
    assert!(fx.sim.navigations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn auth_wall_is_blocked_without_waiting_for_start() {
    let fx = fixture();
    fx.sim.set(
        "bpt6k9",
        Behavior::Blocked {
            title: "Authentification - Gallica".into(),
        },
    );

    let started = Instant::now();
    let report = fx.run(gallica_target("bpt6k9")).await;

    assert_eq!(
        report.outcome,
        Outcome::Blocked {
            indicator: "authentification".into()
        }
    );
    assert_eq!(report.phases.last(), Some(&Phase::BlockDetection));
    // settle (4s) + post-navigation pause (3s), no start wait
    assert_eq!(started.elapsed(), Duration::from_secs(7));
}

#[tokio::test(start_paused = true)]
async fn no_artifact_within_start_window_is_no_start() {
    let fx = fixture();
    fx.sim.set("bpt6k10", Behavior::Ignored);

    let started = Instant::now();
    let report = fx.run(gallica_target("bpt6k10")).await;

    assert_eq!(report.outcome, Outcome::NoStart);
    assert_eq!(report.phases.last(), Some(&Phase::AwaitingStart));
    assert_eq!(started.elapsed(), Duration::from_secs(7 + 15));
}

#[tokio::test(start_paused = true)]
async fn stalled_transfer_times_out() {
    let fx = fixture();
    fx.sim.set("bpt6k11", Behavior::Stall);

    let report = fx.run(gallica_target("bpt6k11")).await;

    assert_eq!(report.outcome, Outcome::Timeout);
    assert_eq!(report.phases.last(), Some(&Phase::Transferring));
    assert!(report.elapsed >= Duration::from_secs(600));
}

#[tokio::test(start_paused = true)]
async fn undersized_artifact_times_out_in_stability_check() {
    let fx = fixture();
    fx.sim.set(
        "bpt6k12",
        Behavior::Download {
            bytes: 200,
            transfer: Duration::from_secs(5),
        },
    );

    let report = fx.run(gallica_target("bpt6k12")).await;

    assert_eq!(report.outcome, Outcome::Timeout);
    assert_eq!(report.phases.last(), Some(&Phase::StabilityCheck));
}

#[tokio::test(start_paused = true)]
async fn aborted_navigation_still_completes() {
    let fx = fixture();
    fx.sim.set(
        "bpt6k13",
        Behavior::AbortedDownload {
            bytes: 8192,
            transfer: Duration::from_secs(5),
        },
    );

    let report = fx.run(gallica_target("bpt6k13")).await;

    assert_eq!(report.outcome, Outcome::Complete { size_bytes: 8192 });
}

#[tokio::test(start_paused = true)]
async fn crashed_session_is_agent_error() {
    let fx = fixture();
    fx.sim.set("bpt6k14", Behavior::Crash);

    let report = fx.run(gallica_target("bpt6k14")).await;

    assert!(matches!(report.outcome, Outcome::AgentError { .. }));
    assert!(report.outcome.requires_recycle());
    assert_eq!(report.phases.last(), Some(&Phase::Navigating));
    assert!(
        report
            .failure_reason
            .as_deref()
            .unwrap()
            .contains("invalid session id")
    );
}

#[tokio::test(start_paused = true)]
async fn closed_session_is_agent_error() {
    let fx = fixture();
    fx.browser.shutdown().await.unwrap();

    let report = fx.run(gallica_target("bpt6k15")).await;

    assert!(matches!(report.outcome, Outcome::AgentError { .. }));
}

#[test]
fn new_attempt_is_pending() {
    let attempt = Attempt::new(3, gallica_target("x"));
    assert_eq!(attempt.state(), AttemptState::Active(Phase::Pending));
    assert_eq!(attempt.target().label(), "x");
}
