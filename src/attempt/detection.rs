//! Block/paywall/auth page detection.

use crate::config::BlockPolicy;

/// Case-insensitive matcher over a page's title and leading content
#[derive(Clone, Debug)]
pub struct BlockDetector {
    indicators: Vec<String>,
    content_prefix_chars: usize,
}

impl BlockDetector {
    /// Build a detector from the configured policy; blank indicators are dropped
    pub fn new(policy: &BlockPolicy) -> Self {
        Self {
            indicators: policy
                .indicators
                .iter()
                .map(|i| i.trim().to_lowercase())
                .filter(|i| !i.is_empty())
                .collect(),
            content_prefix_chars: policy.content_prefix_chars,
        }
    }

    /// First indicator found in `title` or the first `content_prefix_chars`
    /// characters of `content`
    pub fn detect(&self, title: &str, content: &str) -> Option<&str> {
        let title = title.to_lowercase();
        let prefix = content
            .chars()
            .take(self.content_prefix_chars)
            .collect::<String>()
            .to_lowercase();

        // Title and prefix are matched separately so no indicator spans both
        self.indicators
            .iter()
            .find(|indicator| {
                title.contains(indicator.as_str()) || prefix.contains(indicator.as_str())
            })
            .map(String::as_str)
    }
}

impl Default for BlockDetector {
    fn default() -> Self {
        Self::new(&BlockPolicy::default())
    }
}
