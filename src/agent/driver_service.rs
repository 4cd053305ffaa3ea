//! Locally spawned chromedriver
//!
//! Used when the configuration names no WebDriver endpoint. The binary is taken
//! from an explicit path or discovered in PATH, started on a free loopback port,
//! and polled until it reports ready. The child process dies with this handle.
//!
//! A [`DriverSupervisor`] owns the running service and replaces it whenever the
//! process has exited or stopped answering, so recycling a session also
//! recovers from a dead driver.

use crate::error::AgentError;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::Instant;
use url::Url;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Bound on the liveness check run before each new session
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// A running chromedriver process
pub struct DriverService {
    child: Child,
    endpoint: Url,
}

impl DriverService {
    /// Resolve the chromedriver binary: `explicit` if given, otherwise PATH
    pub fn locate(explicit: Option<&Path>) -> Result<PathBuf, AgentError> {
        match explicit {
            Some(path) if path.is_file() => Ok(path.to_path_buf()),
            Some(path) => Err(AgentError::DriverNotFound(path.display().to_string())),
            None => which::which("chromedriver")
                .map_err(|e| AgentError::DriverNotFound(format!("chromedriver: {e}"))),
        }
    }

    /// Start `binary` on a free port and wait until it accepts sessions
    pub async fn spawn(binary: &Path, startup_timeout: Duration) -> Result<Self, AgentError> {
        let port = free_port()?;
        let child = Command::new(binary)
            .arg(format!("--port={port}"))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AgentError::DriverProcess(format!("failed to start {}: {e}", binary.display()))
            })?;

        let endpoint = Url::parse(&format!("http://127.0.0.1:{port}/"))
            .map_err(|e| AgentError::DriverProcess(e.to_string()))?;

        tracing::info!(binary = %binary.display(), port, "Started chromedriver");

        wait_ready(&endpoint, startup_timeout).await?;

        Ok(Self { child, endpoint })
    }

    /// Wrap an already started process serving `endpoint`
    #[cfg(test)]
    pub(crate) fn from_parts(child: Child, endpoint: Url) -> Self {
        Self { child, endpoint }
    }

    /// Endpoint of the running driver
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Whether the process is still running and reports ready on `/status`
    pub async fn is_responsive(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => wait_ready(&self.endpoint, HEALTH_CHECK_TIMEOUT).await.is_ok(),
            Ok(Some(status)) => {
                tracing::warn!(endpoint = %self.endpoint, %status, "chromedriver exited");
                false
            }
            Err(e) => {
                tracing::warn!(endpoint = %self.endpoint, error = %e, "chromedriver state unknown");
                false
            }
        }
    }
}

/// Starts driver processes on demand
#[async_trait]
pub trait DriverLauncher: Send + Sync {
    /// Start a driver and wait until it accepts sessions
    async fn launch(&self) -> Result<DriverService, AgentError>;
}

/// Launches a chromedriver binary through [`DriverService::spawn`]
#[derive(Clone, Debug)]
pub struct ChromeDriverLauncher {
    binary: PathBuf,
    startup_timeout: Duration,
}

impl ChromeDriverLauncher {
    /// Launch `binary`, allowing `startup_timeout` for it to become ready
    pub fn new(binary: PathBuf, startup_timeout: Duration) -> Self {
        Self {
            binary,
            startup_timeout,
        }
    }
}

#[async_trait]
impl DriverLauncher for ChromeDriverLauncher {
    async fn launch(&self) -> Result<DriverService, AgentError> {
        DriverService::spawn(&self.binary, self.startup_timeout).await
    }
}

/// Keeps one driver process alive across session recycles
pub struct DriverSupervisor {
    launcher: Box<dyn DriverLauncher>,
    current: Mutex<Option<DriverService>>,
    launches: AtomicUsize,
}

impl DriverSupervisor {
    /// Supervise drivers started by `launcher`; nothing runs until first use
    pub fn new(launcher: impl DriverLauncher + 'static) -> Self {
        Self {
            launcher: Box::new(launcher),
            current: Mutex::new(None),
            launches: AtomicUsize::new(0),
        }
    }

    /// Endpoint of a responsive driver, launching a replacement if needed
    ///
    /// A driver that has exited or stopped answering is dropped, which kills
    /// its process, before the replacement starts.
    pub async fn ensure_running(&self) -> Result<Url, AgentError> {
        let mut current = self.current.lock().await;

        if let Some(service) = current.as_mut() {
            if service.is_responsive().await {
                return Ok(service.endpoint().clone());
            }
            tracing::warn!(endpoint = %service.endpoint(), "Restarting unresponsive chromedriver");
        }
        *current = None;

        let service = self.launcher.launch().await?;
        let endpoint = service.endpoint().clone();
        let generation = self.launches.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(endpoint = %endpoint, generation, "chromedriver ready");
        *current = Some(service);
        Ok(endpoint)
    }

    /// Drivers launched so far
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

fn free_port() -> Result<u16, AgentError> {
    std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .map_err(|e| AgentError::DriverProcess(format!("no free port: {e}")))
}

/// Poll `GET /status` until the driver reports `ready`, bounded by `timeout`
pub(crate) async fn wait_ready(endpoint: &Url, timeout: Duration) -> Result<(), AgentError> {
    let client = reqwest::Client::builder()
        .timeout(READY_POLL_INTERVAL * 4)
        .build()?;
    let status_url = endpoint
        .join("status")
        .map_err(|e| AgentError::DriverProcess(e.to_string()))?;
    let deadline = Instant::now() + timeout;

    loop {
        if let Ok(response) = client.get(status_url.clone()).send().await {
            let ready = response
                .json::<Value>()
                .await
                .map(|body| body["value"]["ready"].as_bool() == Some(true))
                .unwrap_or(false);
            if ready {
                return Ok(());
            }
        }

        if Instant::now() + READY_POLL_INTERVAL > deadline {
            return Err(AgentError::DriverProcess(format!(
                "driver at {endpoint} not ready after {timeout:?}"
            )));
        }
        tokio::time::sleep(READY_POLL_INTERVAL).await;
    }
}
