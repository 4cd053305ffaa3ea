//! Identifier extraction from source URLs
//!
//! Gallica document URLs look like
//! `https://gallica.bnf.fr/ark:/12148/bpt6k5619759j/f1.item`; the identifier is
//! the path segment following the naming-authority segment (`12148`).

use crate::config::TargetConfig;

/// Extracts identifiers from source URLs according to a [`TargetConfig`]
#[derive(Clone, Debug)]
pub struct TargetResolver {
    url_marker: String,
    authority_segment: String,
}

impl Default for TargetResolver {
    fn default() -> Self {
        Self::new(&TargetConfig::default())
    }
}

impl TargetResolver {
    /// Create a resolver from the target configuration
    pub fn new(config: &TargetConfig) -> Self {
        Self {
            url_marker: config.url_marker.clone(),
            authority_segment: config.authority_segment.clone(),
        }
    }

    /// Extract the identifier from a source URL.
    ///
    /// Returns `None` when the URL lacks the marker, lacks the authority
    /// segment, or ends right after it. A `None` is an expected outcome,
    /// not an error.
    pub fn resolve(&self, raw_url: &str) -> Option<String> {
        if !raw_url.contains(&self.url_marker) {
            return None;
        }

        let mut segments = raw_url.trim_end_matches('/').split('/');
        segments.find(|segment| *segment == self.authority_segment)?;

        segments
            .next()
            .filter(|identifier| !identifier.is_empty())
            .map(str::to_string)
    }
}

/// Resolve with the default Gallica pattern
pub fn resolve(raw_url: &str) -> Option<String> {
    TargetResolver::default().resolve(raw_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_segment_after_authority() {
        assert_eq!(
            resolve("https://gallica.bnf.fr/ark:/12148/bpt6k5619759j"),
            Some("bpt6k5619759j".to_string())
        );
    }

    #[test]
    fn ignores_trailing_path_and_slash() {
        assert_eq!(
            resolve("https://gallica.bnf.fr/ark:/12148/bpt6k5619759j/f1.item/"),
            Some("bpt6k5619759j".to_string())
        );
        assert_eq!(
            resolve("https://gallica.bnf.fr/ark:/12148/btv1b8451602n/"),
            Some("btv1b8451602n".to_string())
        );
    }

    #[test]
    fn missing_marker_is_absent() {
        assert_eq!(resolve("https://gallica.bnf.fr/services/12148/abc"), None);
        assert_eq!(resolve("https://example.org/document.pdf"), None);
    }

    #[test]
    fn missing_authority_is_absent() {
        assert_eq!(resolve("https://gallica.bnf.fr/ark:/99999/abc"), None);
    }

    #[test]
    fn authority_as_last_segment_is_absent() {
        assert_eq!(resolve("https://gallica.bnf.fr/ark:/12148"), None);
        assert_eq!(resolve("https://gallica.bnf.fr/ark:/12148/"), None);
    }

    #[test]
    fn empty_segment_after_authority_is_absent() {
        assert_eq!(resolve("https://gallica.bnf.fr/ark:/12148//x"), None);
    }

    #[test]
    fn resolution_is_deterministic() {
        let url = "https://gallica.bnf.fr/ark:/12148/bpt6k1510948k.texteImage";
        let first = resolve(url);
        for _ in 0..5 {
            assert_eq!(resolve(url), first);
        }
        assert_eq!(first.as_deref(), Some("bpt6k1510948k.texteImage"));
    }

    #[test]
    fn custom_pattern_is_honored() {
        let resolver = TargetResolver::new(&TargetConfig {
            url_marker: "/docs/".into(),
            authority_segment: "docs".into(),
            artifact_url_template: "https://example.org/{id}.pdf".into(),
        });
        assert_eq!(
            resolver.resolve("https://example.org/docs/item-42/view"),
            Some("item-42".to_string())
        );
    }
}
