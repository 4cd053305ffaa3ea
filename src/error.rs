//! Error types for archive-harvest
//!
//! This module separates two families of failure:
//! - [`Error`]: run-level errors. These abort a batch (missing input, bad
//!   configuration, no session could be provisioned).
//! - [`AgentError`]: faults raised by the automation agent. Inside an attempt
//!   they become a terminal `AgentError` outcome and trigger a session recycle;
//!   they only escalate to [`Error`] when provisioning itself fails.

use crate::types::RunSummary;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for archive-harvest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for archive-harvest
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "session.recycle_after")
        key: Option<String>,
    },

    /// The input list does not exist
    #[error("input list not found: {}", .path.display())]
    InputNotFound {
        /// Path that was looked up
        path: PathBuf,
    },

    /// No automation session could be provisioned
    #[error("failed to provision automation session: {0}")]
    Provision(#[source] AgentError),

    /// The replacement session could not be provisioned after a recycle.
    ///
    /// Carries the summary of everything processed before the loss.
    #[error("automation session lost after {} attempts: {source}", .summary.total)]
    SessionLost {
        /// Counters accumulated up to the failure
        summary: RunSummary,
        /// The provisioning failure
        #[source]
        source: AgentError,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML configuration could not be parsed
    #[error("invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Faults surfaced by the automation agent or its driver
#[derive(Debug, Error)]
pub enum AgentError {
    /// The driver endpoint could not be reached or the connection broke
    #[error("agent unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    /// The driver answered with a WebDriver error payload
    #[error("webdriver error `{error}` (HTTP {status}): {message}")]
    Protocol {
        /// HTTP status of the response
        status: u16,
        /// WebDriver error code (e.g. "invalid session id")
        error: String,
        /// Driver-supplied message
        message: String,
    },

    /// The driver answered with something that is not a WebDriver response
    #[error("malformed driver response: {0}")]
    InvalidResponse(String),

    /// The driver binary could not be located
    #[error("driver binary not found: {0}")]
    DriverNotFound(String),

    /// The driver process could not be started or never became ready
    #[error("driver process failed: {0}")]
    DriverProcess(String),

    /// The session handle was used after shutdown
    #[error("session already closed")]
    Closed,
}

/// WebDriver error codes that mean the browser session no longer exists
const SESSION_FATAL_CODES: &[&str] = &[
    "invalid session id",
    "no such window",
    "session not created",
];

impl AgentError {
    /// Whether the fault means the current session is unusable.
    ///
    /// A failed page read on a live session is tolerated by the state machine;
    /// a dead transport or an invalidated session is not.
    pub fn is_session_fatal(&self) -> bool {
        match self {
            AgentError::Transport(_) => true,
            AgentError::Protocol { error, .. } => SESSION_FATAL_CODES.contains(&error.as_str()),
            AgentError::InvalidResponse(_) => false,
            AgentError::DriverNotFound(_) => true,
            AgentError::DriverProcess(_) => true,
            AgentError::Closed => true,
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn protocol(code: &str) -> AgentError {
        AgentError::Protocol {
            status: 404,
            error: code.to_string(),
            message: "test".to_string(),
        }
    }

    #[test]
    fn dead_sessions_are_fatal() {
        assert!(protocol("invalid session id").is_session_fatal());
        assert!(protocol("no such window").is_session_fatal());
        assert!(AgentError::Closed.is_session_fatal());
        assert!(AgentError::DriverProcess("exited".into()).is_session_fatal());
    }

    #[test]
    fn page_level_failures_are_not_fatal() {
        assert!(!protocol("javascript error").is_session_fatal());
        assert!(!protocol("timeout").is_session_fatal());
        assert!(!protocol("unknown error").is_session_fatal());
        assert!(!AgentError::InvalidResponse("no value".into()).is_session_fatal());
    }

    #[test]
    fn config_helper_records_key() {
        let err = Error::config("session.recycle_after", "must be positive");
        match &err {
            Error::Config { key, message } => {
                assert_eq!(key.as_deref(), Some("session.recycle_after"));
                assert_eq!(message, "must be positive");
            }
            other => panic!("unexpected variant {other:?}"),
        }
        assert_eq!(err.to_string(), "configuration error: must be positive");
    }

    #[test]
    fn session_lost_reports_progress() {
        let err = Error::SessionLost {
            summary: RunSummary {
                total: 4,
                successful: 3,
                failed: 1,
            },
            source: AgentError::DriverNotFound("chromedriver".into()),
        };
        assert!(err.to_string().contains("after 4 attempts"));
    }
}
