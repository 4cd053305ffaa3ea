//! # archive-harvest
//!
//! Unattended batch retrieval of documents from a digital library that sits
//! behind anti-automation defenses.
//!
//! ## Design Philosophy
//!
//! archive-harvest is designed to be:
//! - **Outcome-inferring** - The browser reports nothing; success, blocks and
//!   stalls are inferred from page heuristics and the download directory
//! - **Strictly sequential** - One browser session, one attempt at a time,
//!   unhurried human-scale pacing
//! - **Resumable** - Re-running a list skips everything already on disk
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use archive_harvest::agent::WebDriverProvisioner;
//! use archive_harvest::{BatchOrchestrator, Config, TargetResolver, read_targets};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let resolver = TargetResolver::new(&config.target);
//!     let targets = read_targets(&config.input_path, &resolver)?;
//!
//!     let provisioner =
//!         WebDriverProvisioner::new("http://127.0.0.1:9515", Duration::from_secs(90))?;
//!     let mut orchestrator = BatchOrchestrator::from_config(&config, Arc::new(provisioner))?;
//!
//!     let mut events = orchestrator.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = orchestrator.run(targets).await?;
//!     println!("{} ok, {} failed", summary.successful, summary.failed);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Browser automation agents
pub mod agent;
/// Per-target attempt state machine
pub mod attempt;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Input list parsing
pub mod input;
/// Download directory observation
pub mod observer;
/// Batch orchestration
pub mod orchestrator;
/// Randomized delays
pub mod pacing;
/// Identifier extraction from source URLs
pub mod resolver;
/// Session lifecycle management
pub mod session;
/// Core types and events
pub mod types;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use config::Config;
pub use error::{AgentError, Error, Result};
pub use input::read_targets;
pub use observer::{ArtifactObserver, DirectoryProbe};
pub use orchestrator::BatchOrchestrator;
pub use resolver::TargetResolver;
pub use session::SessionManager;
pub use types::{AttemptReport, Event, Outcome, OutcomeClass, Phase, RunSummary, Target};
