//! Automation agent abstraction
//!
//! The agent is the browser that actually fetches documents. This crate
//! never sees a transfer directly; it only tells the agent where to go, reads
//! back what the agent is showing, and watches the download directory.
//!
//! ## Architecture
//!
//! - [`AutomationAgent`]: one live browser session
//! - [`AgentProvisioner`]: creates sessions configured by [`SessionSettings`]
//! - [`WebDriverProvisioner`]: production implementation over the W3C WebDriver protocol
//! - [`DriverService`]: a locally spawned chromedriver for when no endpoint is given
//! - [`DriverSupervisor`]: relaunches that chromedriver when it dies between sessions

use crate::config::{Config, TransportConfig};
use crate::error::AgentError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

/// Locally spawned chromedriver process
pub mod driver_service;
/// W3C WebDriver client
pub mod webdriver;

pub use driver_service::{ChromeDriverLauncher, DriverLauncher, DriverService, DriverSupervisor};
pub use webdriver::{WebDriverProvisioner, WebDriverSession};

/// One provisioned browser session
#[async_trait]
pub trait AutomationAgent: Send + Sync {
    /// Load `url` in the current window
    async fn navigate(&self, url: &str) -> Result<(), AgentError>;

    /// Title of the currently displayed page
    async fn current_title(&self) -> Result<String, AgentError>;

    /// Markup of the currently displayed page
    async fn current_content(&self) -> Result<String, AgentError>;

    /// End the session; later calls fail with [`AgentError::Closed`]
    async fn shutdown(&self) -> Result<(), AgentError>;
}

/// Creates [`AutomationAgent`] sessions
#[async_trait]
pub trait AgentProvisioner: Send + Sync {
    /// Provision a fresh session configured by `settings`
    async fn provision(
        &self,
        settings: &SessionSettings,
    ) -> Result<Box<dyn AutomationAgent>, AgentError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Settings applied to every provisioned session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSettings {
    /// Absolute directory downloads are written to
    pub download_dir: PathBuf,
    /// Ask before each download (always false for unattended runs)
    pub prompt_for_download: bool,
    /// Render PDFs in the built-in viewer instead of saving them
    pub inline_pdf_viewer: bool,
    /// Page-load timeout applied to navigations
    pub page_load_timeout: Duration,
    /// Extra browser command-line arguments
    pub browser_args: Vec<String>,
    /// TLS handling scoped to this session
    pub transport: TransportConfig,
}

impl SessionSettings {
    /// Build unattended-download settings from the run configuration
    pub fn from_config(config: &Config) -> std::io::Result<Self> {
        Ok(Self {
            download_dir: std::path::absolute(&config.download_dir)?,
            prompt_for_download: false,
            inline_pdf_viewer: false,
            page_load_timeout: config.session.page_load_timeout,
            browser_args: config.session.browser_args.clone(),
            transport: config.session.transport,
        })
    }
}
