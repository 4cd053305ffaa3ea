//! Per-target attempt execution.
//!
//! Split into focused submodules:
//! - [`context`] - Shared per-run inputs (observer, detector, timing)
//! - [`detection`] - Block/paywall/auth page recognition
//! - [`machine`] - Phase pipeline and terminal classification

pub mod context;
pub mod detection;
pub mod machine;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use context::AttemptContext;
pub use detection::BlockDetector;
pub use machine::{Attempt, run_attempt};
