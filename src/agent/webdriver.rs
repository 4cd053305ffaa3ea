//! W3C WebDriver client
//!
//! Speaks the plain JSON wire protocol to chromedriver (or any compatible
//! endpoint). Only the handful of commands the downloader needs are implemented.

use super::{AgentProvisioner, AutomationAgent, DriverSupervisor, SessionSettings};
use crate::error::AgentError;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use url::Url;

/// Where new sessions are created
enum Endpoint {
    /// An externally managed WebDriver server
    Fixed(Url),
    /// A chromedriver owned by this process, relaunched when it dies
    Supervised(DriverSupervisor),
}

/// Provisions Chrome sessions through a WebDriver endpoint
pub struct WebDriverProvisioner {
    endpoint: Endpoint,
    request_timeout: Duration,
}

impl WebDriverProvisioner {
    /// Use an already running WebDriver endpoint
    pub fn new(endpoint: &str, request_timeout: Duration) -> Result<Self, AgentError> {
        Ok(Self {
            endpoint: Endpoint::Fixed(normalize_endpoint(endpoint)?),
            request_timeout,
        })
    }

    /// Use drivers started by `supervisor`, checked before every new session
    pub fn supervised(supervisor: DriverSupervisor, request_timeout: Duration) -> Self {
        Self {
            endpoint: Endpoint::Supervised(supervisor),
            request_timeout,
        }
    }

    /// The fixed endpoint, or `None` when drivers are supervised
    pub fn endpoint(&self) -> Option<&Url> {
        match &self.endpoint {
            Endpoint::Fixed(url) => Some(url),
            Endpoint::Supervised(_) => None,
        }
    }

    /// Endpoint for the next session; a supervised driver is revived first if needed
    async fn session_endpoint(&self) -> Result<Url, AgentError> {
        match &self.endpoint {
            Endpoint::Fixed(url) => Ok(url.clone()),
            Endpoint::Supervised(supervisor) => supervisor.ensure_running().await,
        }
    }
}

/// Ensure the endpoint path ends with `/` so relative joins append
fn normalize_endpoint(endpoint: &str) -> Result<Url, AgentError> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| AgentError::InvalidResponse(format!("invalid endpoint {endpoint}: {e}")))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// New-session payload requesting unattended downloads into `settings.download_dir`
pub(crate) fn new_session_payload(settings: &SessionSettings) -> Value {
    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "acceptInsecureCerts": settings.transport.accept_insecure_certs,
                "pageLoadStrategy": "normal",
                "timeouts": {
                    "pageLoad": settings.page_load_timeout.as_millis() as u64,
                },
                "goog:chromeOptions": {
                    "args": settings.browser_args,
                    "prefs": {
                        "download.default_directory": settings.download_dir.to_string_lossy(),
                        "download.prompt_for_download": settings.prompt_for_download,
                        "plugins.always_open_pdf_externally": !settings.inline_pdf_viewer,
                    },
                },
            },
        },
    })
}

/// Unwrap a WebDriver response envelope, turning error payloads into [`AgentError::Protocol`]
async fn read_value(response: reqwest::Response) -> Result<Value, AgentError> {
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| AgentError::InvalidResponse(format!("HTTP {status}: {e}")))?;

    let value = match body {
        Value::Object(mut map) => map.remove("value").unwrap_or(Value::Null),
        other => {
            return Err(AgentError::InvalidResponse(format!(
                "expected an object, got {other}"
            )));
        }
    };

    if !status.is_success() {
        let field = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        return Err(AgentError::Protocol {
            status: status.as_u16(),
            error: field("error"),
            message: field("message"),
        });
    }

    Ok(value)
}

#[async_trait]
impl AgentProvisioner for WebDriverProvisioner {
    async fn provision(
        &self,
        settings: &SessionSettings,
    ) -> Result<Box<dyn AutomationAgent>, AgentError> {
        let client = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .danger_accept_invalid_certs(settings.transport.accept_insecure_certs)
            .build()?;

        let endpoint = self.session_endpoint().await?;
        let url = endpoint
            .join("session")
            .map_err(|e| AgentError::InvalidResponse(e.to_string()))?;

        let response = client
            .post(url)
            .json(&new_session_payload(settings))
            .send()
            .await?;
        let value = read_value(response).await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| AgentError::InvalidResponse("new session without sessionId".into()))?
            .to_string();

        tracing::info!(
            session_id = %session_id,
            download_dir = %settings.download_dir.display(),
            "WebDriver session created"
        );

        let session_url = endpoint
            .join(&format!("session/{session_id}"))
            .map_err(|e| AgentError::InvalidResponse(e.to_string()))?;
        let base = endpoint
            .join(&format!("session/{session_id}/"))
            .map_err(|e| AgentError::InvalidResponse(e.to_string()))?;

        Ok(Box::new(WebDriverSession {
            client,
            session_url,
            base,
            session_id,
            closed: AtomicBool::new(false),
        }))
    }

    fn name(&self) -> &'static str {
        "webdriver"
    }
}

/// A live WebDriver session
pub struct WebDriverSession {
    client: reqwest::Client,
    /// `{endpoint}/session/{id}`
    session_url: Url,
    /// `{endpoint}/session/{id}/`, base for commands
    base: Url,
    session_id: String,
    closed: AtomicBool,
}

impl WebDriverSession {
    /// Session id assigned by the driver
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn command_url(&self, command: &str) -> Result<Url, AgentError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AgentError::Closed);
        }
        self.base
            .join(command)
            .map_err(|e| AgentError::InvalidResponse(e.to_string()))
    }

    async fn get_string(&self, command: &str) -> Result<String, AgentError> {
        let response = self.client.get(self.command_url(command)?).send().await?;
        match read_value(response).await? {
            Value::String(s) => Ok(s),
            other => Err(AgentError::InvalidResponse(format!(
                "{command}: expected a string, got {other}"
            ))),
        }
    }
}

#[async_trait]
impl AutomationAgent for WebDriverSession {
    async fn navigate(&self, url: &str) -> Result<(), AgentError> {
        let response = self
            .client
            .post(self.command_url("url")?)
            .json(&json!({ "url": url }))
            .send()
            .await?;
        read_value(response).await?;
        Ok(())
    }

    async fn current_title(&self) -> Result<String, AgentError> {
        self.get_string("title").await
    }

    async fn current_content(&self) -> Result<String, AgentError> {
        self.get_string("source").await
    }

    async fn shutdown(&self) -> Result<(), AgentError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let response = self
            .client
            .delete(self.session_url.clone())
            .send()
            .await?;
        read_value(response).await?;
        tracing::debug!(session_id = %self.session_id, "WebDriver session deleted");
        Ok(())
    }
}
