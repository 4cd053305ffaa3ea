//! Shared test helpers: a simulated browser that writes downloads into a real directory.

use crate::agent::{
    AgentProvisioner, AutomationAgent, DriverLauncher, DriverService, SessionSettings,
};
use crate::config::{Config, TransportConfig};
use crate::error::AgentError;
use crate::observer::{ArtifactObserver, DirectoryProbe, ObserverTiming};
use crate::types::Target;
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::process::Stdio;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// What the simulated site does when an artifact URL is opened
#[derive(Clone, Debug)]
pub(crate) enum Behavior {
    /// Partial file appears immediately, finished file after `transfer`
    Download { bytes: usize, transfer: Duration },
    /// Same as `Download`, but the navigation itself reports an aborted load
    AbortedDownload { bytes: usize, transfer: Duration },
    /// An auth/paywall page with the given title
    Blocked { title: String },
    /// Nothing happens at all
    Ignored,
    /// A partial file appears and never finishes
    Stall,
    /// The browser dies; this and every later call on the session fail
    Crash,
}

impl Default for Behavior {
    fn default() -> Self {
        Behavior::Download {
            bytes: 4096,
            transfer: Duration::from_secs(10),
        }
    }
}

/// State shared by every simulated session of one test
pub(crate) struct Simulation {
    pub dir: PathBuf,
    behaviors: Mutex<HashMap<String, Behavior>>,
    navigations: Mutex<Vec<String>>,
    pub provisions: AtomicUsize,
    pub shutdowns: AtomicUsize,
    /// Provisioning number (1-based) that fails, if any
    fail_provision_at: Mutex<Option<usize>>,
}

impl Simulation {
    pub fn new(dir: &Path) -> Arc<Self> {
        Arc::new(Self {
            dir: dir.to_path_buf(),
            behaviors: Mutex::new(HashMap::new()),
            navigations: Mutex::new(Vec::new()),
            provisions: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
            fail_provision_at: Mutex::new(None),
        })
    }

    pub fn set(&self, identifier: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(identifier.to_string(), behavior);
    }

    pub fn fail_provision_at(&self, n: usize) {
        *self.fail_provision_at.lock().unwrap() = Some(n);
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    pub fn provisions(&self) -> usize {
        self.provisions.load(Ordering::SeqCst)
    }

    fn behavior(&self, identifier: &str) -> Behavior {
        self.behaviors
            .lock()
            .unwrap()
            .get(identifier)
            .cloned()
            .unwrap_or_default()
    }
}

/// One simulated browser session
pub(crate) struct SimulatedBrowser {
    sim: Arc<Simulation>,
    title: Mutex<String>,
    dead: AtomicBool,
    closed: AtomicBool,
}

impl SimulatedBrowser {
    pub fn new(sim: Arc<Simulation>) -> Self {
        Self {
            sim,
            title: Mutex::new(String::new()),
            dead: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    fn check_alive(&self) -> Result<(), AgentError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AgentError::Closed);
        }
        if self.dead.load(Ordering::SeqCst) {
            return Err(invalid_session());
        }
        Ok(())
    }

    fn start_download(&self, identifier: &str, bytes: usize, transfer: Duration) {
        let partial = self.sim.dir.join(format!("{identifier}.pdf.crdownload"));
        let finished = self.sim.dir.join(format!("{identifier}.pdf"));
        std::fs::write(&partial, b"").unwrap();
        tokio::spawn(async move {
            tokio::time::sleep(transfer).await;
            // The test may already have dropped the directory
            let _ = std::fs::write(&finished, vec![0u8; bytes]);
            let _ = std::fs::remove_file(&partial);
        });
    }
}

fn invalid_session() -> AgentError {
    AgentError::Protocol {
        status: 404,
        error: "invalid session id".into(),
        message: "session deleted because of page crash".into(),
    }
}

/// Identifier of a direct artifact URL (`.../{id}.pdf`)
fn artifact_identifier(url: &str) -> Option<&str> {
    url.rsplit('/').next()?.strip_suffix(".pdf")
}

#[async_trait]
impl AutomationAgent for SimulatedBrowser {
    async fn navigate(&self, url: &str) -> Result<(), AgentError> {
        self.check_alive()?;
        self.sim.navigations.lock().unwrap().push(url.to_string());
        *self.title.lock().unwrap() = String::new();

        let Some(identifier) = artifact_identifier(url) else {
            *self.title.lock().unwrap() = "Gallica".to_string();
            return Ok(());
        };

        match self.sim.behavior(identifier) {
            Behavior::Download { bytes, transfer } => {
                self.start_download(identifier, bytes, transfer);
                Ok(())
            }
            Behavior::AbortedDownload { bytes, transfer } => {
                self.start_download(identifier, bytes, transfer);
                Err(AgentError::Protocol {
                    status: 500,
                    error: "unknown error".into(),
                    message: "net::ERR_ABORTED".into(),
                })
            }
            Behavior::Blocked { title } => {
                *self.title.lock().unwrap() = title;
                Ok(())
            }
            Behavior::Ignored => Ok(()),
            Behavior::Stall => {
                let partial = self.sim.dir.join(format!("{identifier}.pdf.crdownload"));
                std::fs::write(partial, b"").unwrap();
                Ok(())
            }
            Behavior::Crash => {
                self.dead.store(true, Ordering::SeqCst);
                Err(invalid_session())
            }
        }
    }

    async fn current_title(&self) -> Result<String, AgentError> {
        self.check_alive()?;
        Ok(self.title.lock().unwrap().clone())
    }

    async fn current_content(&self) -> Result<String, AgentError> {
        self.check_alive()?;
        Ok("<html><body></body></html>".to_string())
    }

    async fn shutdown(&self) -> Result<(), AgentError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(AgentError::Closed);
        }
        self.sim.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Provisions [`SimulatedBrowser`] sessions over one [`Simulation`]
pub(crate) struct SimulatedProvisioner {
    pub sim: Arc<Simulation>,
}

#[async_trait]
impl AgentProvisioner for SimulatedProvisioner {
    async fn provision(
        &self,
        _settings: &SessionSettings,
    ) -> Result<Box<dyn AutomationAgent>, AgentError> {
        let n = self.sim.provisions.fetch_add(1, Ordering::SeqCst) + 1;
        if *self.sim.fail_provision_at.lock().unwrap() == Some(n) {
            return Err(AgentError::DriverProcess("browser failed to start".into()));
        }
        Ok(Box::new(SimulatedBrowser::new(self.sim.clone())))
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

/// Config rooted at `dir` with deterministic settle and pacing delays
pub(crate) fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.download_dir = dir.to_path_buf();
    config.timing.settle_min = Duration::from_secs(4);
    config.timing.settle_max = Duration::from_secs(4);
    config.pacing.delay_min = Duration::from_secs(4);
    config.pacing.delay_max = Duration::from_secs(4);
    config
}

pub(crate) fn test_settings(dir: &Path) -> SessionSettings {
    SessionSettings {
        download_dir: dir.to_path_buf(),
        prompt_for_download: false,
        inline_pdf_viewer: false,
        page_load_timeout: Duration::from_secs(60),
        browser_args: vec![],
        transport: TransportConfig::default(),
    }
}

pub(crate) fn directory_observer(config: &Config) -> ArtifactObserver {
    ArtifactObserver::new(
        Arc::new(DirectoryProbe::new(&config.download_dir, &config.artifacts)),
        ObserverTiming::from_config(&config.timing, &config.artifacts),
    )
}

pub(crate) fn gallica_target(identifier: &str) -> Target {
    Target::new(
        format!("https://gallica.bnf.fr/ark:/12148/{identifier}"),
        Some(identifier.to_string()),
    )
}

/// "Launches" drivers whose endpoints are mock servers started by the test.
/// Each launch runs a shell `script` as the driver process.
pub(crate) struct ScriptedLauncher {
    drivers: Mutex<VecDeque<(Url, &'static str)>>,
}

impl ScriptedLauncher {
    pub fn new(drivers: Vec<(Url, &'static str)>) -> Self {
        Self {
            drivers: Mutex::new(drivers.into()),
        }
    }
}

#[async_trait]
impl DriverLauncher for ScriptedLauncher {
    async fn launch(&self) -> Result<DriverService, AgentError> {
        let (endpoint, script) = self
            .drivers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AgentError::DriverProcess("no driver left to launch".into()))?;
        let child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AgentError::DriverProcess(e.to_string()))?;
        Ok(DriverService::from_parts(child, endpoint))
    }
}

/// A dedicated (unpooled) mock driver that reports ready; dropping it closes the port
pub(crate) async fn mock_ready_driver() -> MockServer {
    let server = MockServer::builder().start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": { "ready": true, "message": "ChromeDriver ready for new sessions." }
        })))
        .mount(&server)
        .await;
    server
}

pub(crate) fn endpoint_of(server: &MockServer) -> Url {
    Url::parse(&format!("{}/", server.uri())).unwrap()
}
