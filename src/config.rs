//! Configuration types for archive-harvest
//!
//! Every field has a default, so an empty TOML file (or `Config::default()`)
//! reproduces the pacing and timeouts the tool has always used against Gallica.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for a batch run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Input list, one source URL per line (first comma-separated field)
    #[serde(default = "default_input_path")]
    pub input_path: PathBuf,

    /// Directory the browser downloads into and the observer watches
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Automation session settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Per-phase waits and timeouts
    #[serde(default)]
    pub timing: TimingConfig,

    /// Delay between attempts
    #[serde(default)]
    pub pacing: PacingConfig,

    /// How artifacts are named on disk
    #[serde(default)]
    pub artifacts: ArtifactConfig,

    /// How identifiers are extracted and artifact URLs are built
    #[serde(default)]
    pub target: TargetConfig,

    /// Block/paywall/auth detection vocabulary
    #[serde(default)]
    pub block: BlockPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_path: default_input_path(),
            download_dir: default_download_dir(),
            session: SessionConfig::default(),
            timing: TimingConfig::default(),
            pacing: PacingConfig::default(),
            artifacts: ArtifactConfig::default(),
            target: TargetConfig::default(),
            block: BlockPolicy::default(),
        }
    }
}

impl Config {
    /// Load a configuration file; missing keys fall back to defaults
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&text)?;
        Ok(config)
    }

    /// Reject settings that would make a run meaningless or unbounded
    pub fn validate(&self) -> Result<()> {
        if self.session.recycle_after == 0 {
            return Err(Error::config(
                "session.recycle_after",
                "recycle cadence must be a positive number of attempts",
            ));
        }

        // A slow page load must surface as a WebDriver timeout, not a transport one
        if self.session.request_timeout <= self.session.page_load_timeout {
            return Err(Error::config(
                "session.request_timeout",
                "request timeout must exceed the page load timeout",
            ));
        }

        check_bounds(
            "timing.settle_min",
            self.timing.settle_min,
            self.timing.settle_max,
        )?;
        check_bounds(
            "pacing.delay_min",
            self.pacing.delay_min,
            self.pacing.delay_max,
        )?;

        for (key, interval) in [
            ("timing.start_poll_interval", self.timing.start_poll_interval),
            (
                "timing.completion_poll_interval",
                self.timing.completion_poll_interval,
            ),
            ("timing.settle_poll_interval", self.timing.settle_poll_interval),
        ] {
            if interval.is_zero() {
                return Err(Error::config(key, "poll interval must be non-zero"));
            }
        }

        if self.artifacts.extension.is_empty() || self.artifacts.partial_extension.is_empty() {
            return Err(Error::config(
                "artifacts.extension",
                "artifact extensions must not be empty",
            ));
        }

        if !self.target.artifact_url_template.contains("{id}") {
            return Err(Error::config(
                "target.artifact_url_template",
                "template must contain the {id} placeholder",
            ));
        }

        if self.target.authority_segment.is_empty() {
            return Err(Error::config(
                "target.authority_segment",
                "authority segment must not be empty",
            ));
        }

        Ok(())
    }
}

fn check_bounds(key: &str, min: Duration, max: Duration) -> Result<()> {
    if min > max {
        return Err(Error::config(
            key,
            format!("lower bound {min:?} exceeds upper bound {max:?}"),
        ));
    }
    Ok(())
}

/// Automation session settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Existing WebDriver endpoint (e.g. "http://localhost:9515").
    ///
    /// When unset, a local chromedriver is spawned.
    #[serde(default)]
    pub webdriver_url: Option<String>,

    /// Path to the chromedriver binary (searched in PATH if None)
    #[serde(default)]
    pub chromedriver_path: Option<PathBuf>,

    /// Attempts served by one session before it is replaced (default: 10)
    #[serde(default = "default_recycle_after")]
    pub recycle_after: usize,

    /// Pause between tearing a session down and provisioning its replacement (default: 3s)
    #[serde(default = "default_restart_pause", with = "duration_serde")]
    pub restart_pause: Duration,

    /// Pause before the final session is released at run end (default: 5s)
    #[serde(default = "default_shutdown_grace", with = "duration_serde")]
    pub shutdown_grace: Duration,

    /// Browser page-load timeout applied to every navigation (default: 60s)
    #[serde(default = "default_page_load_timeout", with = "duration_serde")]
    pub page_load_timeout: Duration,

    /// Upper bound on any single request to the driver (default: 90s)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// How long to wait for a spawned chromedriver to report ready (default: 20s)
    #[serde(default = "default_driver_startup_timeout", with = "duration_serde")]
    pub driver_startup_timeout: Duration,

    /// Extra command-line arguments for the browser
    #[serde(default)]
    pub browser_args: Vec<String>,

    /// TLS handling for the driver connection and the browser
    #[serde(default)]
    pub transport: TransportConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            webdriver_url: None,
            chromedriver_path: None,
            recycle_after: default_recycle_after(),
            restart_pause: default_restart_pause(),
            shutdown_grace: default_shutdown_grace(),
            page_load_timeout: default_page_load_timeout(),
            request_timeout: default_request_timeout(),
            driver_startup_timeout: default_driver_startup_timeout(),
            browser_args: Vec::new(),
            transport: TransportConfig::default(),
        }
    }
}

/// TLS settings scoped to one provisioned session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Let the browser accept invalid certificates, and the driver client too (default: false)
    #[serde(default)]
    pub accept_insecure_certs: bool,
}

/// Per-phase waits and timeouts
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Lower bound of the randomized settle delay after the landing page (default: 3s)
    #[serde(default = "default_settle_min", with = "duration_serde")]
    pub settle_min: Duration,

    /// Upper bound of the randomized settle delay after the landing page (default: 5s)
    #[serde(default = "default_settle_max", with = "duration_serde")]
    pub settle_max: Duration,

    /// Pause after navigating to the artifact URL before inspecting the page (default: 3s)
    #[serde(default = "default_post_navigation_delay", with = "duration_serde")]
    pub post_navigation_delay: Duration,

    /// How long to wait for a partial or finished artifact to appear (default: 15s)
    #[serde(default = "default_start_timeout", with = "duration_serde")]
    pub start_timeout: Duration,

    /// Poll interval while waiting for the start (default: 1s)
    #[serde(default = "default_start_poll_interval", with = "duration_serde")]
    pub start_poll_interval: Duration,

    /// How long a started transfer may take to finish and stabilize (default: 600s)
    #[serde(default = "default_completion_timeout", with = "duration_serde")]
    pub completion_timeout: Duration,

    /// Poll interval while waiting for completion (default: 3s)
    #[serde(default = "default_completion_poll_interval", with = "duration_serde")]
    pub completion_poll_interval: Duration,

    /// Gap between the size samples of the stability check (default: 5s)
    #[serde(default = "default_stability_cooldown", with = "duration_serde")]
    pub stability_cooldown: Duration,

    /// Final wait for in-flight partial artifacts at run end (default: 120s)
    #[serde(default = "default_settle_timeout", with = "duration_serde")]
    pub settle_timeout: Duration,

    /// Poll interval of the final wait (default: 2s)
    #[serde(default = "default_settle_poll_interval", with = "duration_serde")]
    pub settle_poll_interval: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_min: default_settle_min(),
            settle_max: default_settle_max(),
            post_navigation_delay: default_post_navigation_delay(),
            start_timeout: default_start_timeout(),
            start_poll_interval: default_start_poll_interval(),
            completion_timeout: default_completion_timeout(),
            completion_poll_interval: default_completion_poll_interval(),
            stability_cooldown: default_stability_cooldown(),
            settle_timeout: default_settle_timeout(),
            settle_poll_interval: default_settle_poll_interval(),
        }
    }
}

/// Randomized delay inserted between attempts
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Lower bound (default: 3s)
    #[serde(default = "default_delay_min", with = "duration_serde")]
    pub delay_min: Duration,

    /// Upper bound (default: 6s)
    #[serde(default = "default_delay_max", with = "duration_serde")]
    pub delay_max: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            delay_min: default_delay_min(),
            delay_max: default_delay_max(),
        }
    }
}

/// Artifact naming convention, owned by the browser and observed here
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Extension of finished artifacts, without the dot (default: "pdf")
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Extension of in-progress artifacts, without the dot (default: "crdownload")
    #[serde(default = "default_partial_extension")]
    pub partial_extension: String,

    /// Finished artifacts smaller than this are not treated as complete (default: 1000)
    #[serde(default = "default_min_complete_bytes")]
    pub min_complete_bytes: u64,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            extension: default_extension(),
            partial_extension: default_partial_extension(),
            min_complete_bytes: default_min_complete_bytes(),
        }
    }
}

/// Identifier extraction and direct-artifact URL construction
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Substring a URL must contain to be considered at all (default: "ark:")
    #[serde(default = "default_url_marker")]
    pub url_marker: String,

    /// Path segment immediately preceding the identifier (default: "12148")
    #[serde(default = "default_authority_segment")]
    pub authority_segment: String,

    /// Direct artifact URL; `{id}` is replaced by the identifier
    #[serde(default = "default_artifact_url_template")]
    pub artifact_url_template: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            url_marker: default_url_marker(),
            authority_segment: default_authority_segment(),
            artifact_url_template: default_artifact_url_template(),
        }
    }
}

impl TargetConfig {
    /// Direct artifact URL for an identifier
    pub fn artifact_url(&self, identifier: &str) -> String {
        self.artifact_url_template.replace("{id}", identifier)
    }
}

/// Keyword table used to recognize error, paywall and login pages
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockPolicy {
    /// Case-insensitive substrings; any match marks the page as blocked
    #[serde(default = "default_block_indicators")]
    pub indicators: Vec<String>,

    /// Number of leading characters of the page content that are inspected (default: 2000)
    #[serde(default = "default_content_prefix_chars")]
    pub content_prefix_chars: usize,
}

impl Default for BlockPolicy {
    fn default() -> Self {
        Self {
            indicators: default_block_indicators(),
            content_prefix_chars: default_content_prefix_chars(),
        }
    }
}

fn default_input_path() -> PathBuf {
    PathBuf::from("test.csv")
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("gallica_downloads")
}

fn default_recycle_after() -> usize {
    10
}

fn default_restart_pause() -> Duration {
    Duration::from_secs(3)
}

fn default_shutdown_grace() -> Duration {
    Duration::from_secs(5)
}

fn default_page_load_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(90)
}

fn default_driver_startup_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_settle_min() -> Duration {
    Duration::from_secs(3)
}

fn default_settle_max() -> Duration {
    Duration::from_secs(5)
}

fn default_post_navigation_delay() -> Duration {
    Duration::from_secs(3)
}

fn default_start_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_start_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_completion_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_completion_poll_interval() -> Duration {
    Duration::from_secs(3)
}

fn default_stability_cooldown() -> Duration {
    Duration::from_secs(5)
}

fn default_settle_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_settle_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_delay_min() -> Duration {
    Duration::from_secs(3)
}

fn default_delay_max() -> Duration {
    Duration::from_secs(6)
}

fn default_extension() -> String {
    "pdf".to_string()
}

fn default_partial_extension() -> String {
    "crdownload".to_string()
}

fn default_min_complete_bytes() -> u64 {
    1000
}

fn default_url_marker() -> String {
    "ark:".to_string()
}

fn default_authority_segment() -> String {
    "12148".to_string()
}

fn default_artifact_url_template() -> String {
    "https://gallica.bnf.fr/ark:/12148/{id}.pdf".to_string()
}

fn default_block_indicators() -> Vec<String> {
    [
        "erreur",
        "error",
        "not found",
        "404",
        "access denied",
        "authentification",
        "authentication",
        "login",
        "connexion",
        "restricted",
        "restreint",
        "indisponible",
        "unavailable",
        "payant",
        "payment",
        "abonnement",
        "subscription",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_content_prefix_chars() -> usize {
    2000
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
