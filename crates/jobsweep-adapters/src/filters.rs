//! Cheap title/location pre-filters shared by every adapter, plus HTML
//! stripping for description fields.

use regex::Regex;
use scraper::Html;
use tracing::warn;

/// Compiled filter patterns for one source. Empty pattern lists mean the
/// corresponding filter is disabled and everything passes.
#[derive(Debug, Default)]
pub struct FilterSet {
    title_patterns: Vec<Regex>,
    target_locations: Vec<String>,
}

impl FilterSet {
    pub fn new(title_patterns: &[String], target_locations: &[String]) -> Self {
        let mut compiled = Vec::with_capacity(title_patterns.len());
        for pattern in title_patterns {
            match Regex::new(&pattern.to_lowercase()) {
                Ok(regex) => compiled.push(regex),
                Err(err) => warn!(pattern, %err, "skipping invalid title pattern"),
            }
        }
        Self {
            title_patterns: compiled,
            target_locations: target_locations
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    /// Title must match at least one configured pattern.
    pub fn is_relevant_role(&self, title: &str) -> bool {
        if self.title_patterns.is_empty() {
            return true;
        }
        let title = title.to_lowercase();
        self.title_patterns.iter().any(|p| p.is_match(&title))
    }

    /// Location must contain at least one target substring. Multi-location
    /// values are split on `; / | • \n` and a match on any token counts.
    pub fn matches_target_location(&self, location: &str) -> bool {
        if self.target_locations.is_empty() {
            return true;
        }
        if location.is_empty() {
            return false;
        }

        let location = location.to_lowercase();
        let mut tokens: Vec<&str> = vec![location.as_str()];
        tokens.extend(
            location
                .split([';', '/', '|', '•', '\n'])
                .map(str::trim)
                .filter(|t| !t.is_empty()),
        );

        tokens
            .iter()
            .any(|token| self.target_locations.iter().any(|p| token.contains(p)))
    }
}

/// Flatten an HTML description to normalized plain text. Some boards return
/// entity-encoded markup (`&lt;div&gt;` instead of `<div>`), so decoding can
/// surface a second layer of tags; strip again when that happens.
pub fn strip_html(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }
    let mut text = strip_once(html);
    if text.contains('<') && text.contains('>') {
        text = strip_once(&text);
    }
    text
}

fn strip_once(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let text: String = fragment
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters() -> FilterSet {
        FilterSet::new(
            &[
                "data (analyst|engineer|scientist)".to_string(),
                "product manager".to_string(),
            ],
            &["london".to_string(), "remote".to_string()],
        )
    }

    #[test]
    fn titles_match_any_configured_pattern() {
        let filters = filters();
        assert!(filters.is_relevant_role("Senior Data Engineer"));
        assert!(filters.is_relevant_role("Group Product Manager"));
        assert!(!filters.is_relevant_role("Account Executive"));
    }

    #[test]
    fn empty_title_patterns_disable_filtering() {
        let filters = FilterSet::disabled();
        assert!(filters.is_relevant_role("Account Executive"));
        assert!(filters.matches_target_location("Lagos"));
    }

    #[test]
    fn multi_location_strings_match_on_any_token() {
        let filters = filters();
        assert!(filters.matches_target_location("London, UK"));
        assert!(filters.matches_target_location("San Francisco, CA / Remote"));
        assert!(filters.matches_target_location("Berlin; London"));
        assert!(!filters.matches_target_location("Austin, TX; Berlin"));
        assert!(!filters.matches_target_location(""));
    }

    #[test]
    fn invalid_patterns_are_skipped_not_fatal() {
        let filters = FilterSet::new(
            &["data engineer".to_string(), "(unclosed".to_string()],
            &[],
        );
        assert!(filters.is_relevant_role("Data Engineer"));
        assert!(!filters.is_relevant_role("Barista"));
    }

    #[test]
    fn strip_html_flattens_tags_and_whitespace() {
        let text = strip_html("<div><p>Build <b>pipelines</b> in Python &amp; Spark.</p></div>");
        assert_eq!(text, "Build pipelines in Python & Spark.");
        assert_eq!(strip_html(""), "");
    }

    #[test]
    fn strip_html_handles_entity_encoded_markup() {
        let text = strip_html("&lt;p&gt;Build pipelines in Python and Spark.&lt;/p&gt;");
        assert_eq!(text, "Build pipelines in Python and Spark.");
    }
}
