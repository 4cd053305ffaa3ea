//! Input list loading
//!
//! The input is a delimited text file whose first column holds the source URL.
//! Blank lines and lines with an empty first column are skipped silently.

use crate::error::{Error, Result};
use crate::resolver::TargetResolver;
use crate::types::Target;
use std::path::Path;

/// Read the input list and resolve every target, preserving input order
pub fn read_targets(path: &Path, resolver: &TargetResolver) -> Result<Vec<Target>> {
    if !path.exists() {
        return Err(Error::InputNotFound {
            path: path.to_path_buf(),
        });
    }

    let text = std::fs::read_to_string(path)?;
    let targets = parse_targets(&text, resolver);

    tracing::info!(
        path = %path.display(),
        count = targets.len(),
        unresolved = targets.iter().filter(|t| t.identifier.is_none()).count(),
        "Loaded input list"
    );

    Ok(targets)
}

/// Parse input text into targets
pub fn parse_targets(text: &str, resolver: &TargetResolver) -> Vec<Target> {
    text.lines()
        .filter_map(first_field)
        .map(|url| Target::new(url, resolver.resolve(url)))
        .collect()
}

fn first_field(line: &str) -> Option<&str> {
    let field = line.split(',').next()?.trim();
    let field = field
        .strip_prefix('"')
        .and_then(|f| f.strip_suffix('"'))
        .unwrap_or(field)
        .trim();
    (!field.is_empty()).then_some(field)
}
