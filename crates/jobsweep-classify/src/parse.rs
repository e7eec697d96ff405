//! Defensive parsing of classifier output.
//!
//! Providers occasionally wrap JSON in markdown fences, return a
//! single-element list, or emit the string "null" where JSON null belongs.
//! When the JSON is truncated beyond repair, a regex recovery pass salvages
//! `job_subfamily` alone before the posting is declared a classify error.

use std::sync::OnceLock;

use jobsweep_core::Classification;
use regex::Regex;
use serde_json::Value;

use crate::ClassifyError;

pub fn parse_classifier_output(text: &str) -> Result<Classification, ClassifyError> {
    let cleaned = strip_markdown_fences(text);

    let value: Value = match serde_json::from_str(cleaned) {
        Ok(value) => value,
        Err(err) => {
            if let Some(subfamily) = recover_subfamily(cleaned) {
                let mut recovered = Classification::default();
                recovered.role.job_subfamily = Some(subfamily);
                return Ok(recovered);
            }
            return Err(ClassifyError::InvalidJson(err.to_string()));
        }
    };

    let value = match value {
        Value::Array(mut items) if !items.is_empty() => items.remove(0),
        Value::Array(_) => {
            return Err(ClassifyError::InvalidJson("empty JSON array".to_string()))
        }
        other => other,
    };

    let value = sanitize_null_strings(value);

    serde_json::from_value(value).map_err(|err| ClassifyError::SchemaViolation(err.to_string()))
}

/// Remove an optional ```json ... ``` wrapper.
fn strip_markdown_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches(['\r', '\n']);
    rest.strip_suffix("```").map(str::trim).unwrap_or(rest.trim())
}

fn subfamily_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""job_subfamily"\s*:\s*"([a-z0-9_]+)""#).expect("recovery pattern compiles")
    })
}

fn recover_subfamily(text: &str) -> Option<String> {
    subfamily_regex()
        .captures(text)
        .map(|captures| captures[1].to_string())
}

/// Convert string "null" (any casing) to JSON null, recursively.
fn sanitize_null_strings(value: Value) -> Value {
    match value {
        Value::String(s) if s.eq_ignore_ascii_case("null") => Value::Null,
        Value::Array(items) => {
            Value::Array(items.into_iter().map(sanitize_null_strings).collect())
        }
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, sanitize_null_strings(value)))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobsweep_core::WorkingArrangement;

    const VALID: &str = r#"{
        "role": {"job_subfamily": "data_engineer", "seniority": "senior", "track": "ic"},
        "location": {"working_arrangement": "hybrid"},
        "skills": [{"name": "Python"}, {"name": "Spark"}]
    }"#;

    #[test]
    fn plain_json_parses() {
        let parsed = parse_classifier_output(VALID).expect("parse");
        assert_eq!(parsed.role.job_subfamily.as_deref(), Some("data_engineer"));
        assert_eq!(
            parsed.location.working_arrangement,
            Some(WorkingArrangement::Hybrid)
        );
        assert_eq!(parsed.skills.len(), 2);
    }

    #[test]
    fn markdown_fences_are_stripped() {
        let fenced = format!("```json\n{VALID}\n```");
        let parsed = parse_classifier_output(&fenced).expect("parse");
        assert_eq!(parsed.role.seniority.as_deref(), Some("senior"));
    }

    #[test]
    fn bare_list_takes_first_element() {
        let listed = format!("[{VALID}]");
        let parsed = parse_classifier_output(&listed).expect("parse");
        assert_eq!(parsed.role.job_subfamily.as_deref(), Some("data_engineer"));
    }

    #[test]
    fn null_strings_become_json_null() {
        let parsed = parse_classifier_output(
            r#"{"role": {"job_subfamily": "core_pm", "seniority": "null", "track": "NULL"}}"#,
        )
        .expect("parse");
        assert_eq!(parsed.role.seniority, None);
        assert_eq!(parsed.role.track, None);
    }

    #[test]
    fn truncated_json_recovers_the_subfamily() {
        let truncated = r#"{"role": {"job_subfamily": "ml_engineer", "seniority": "sen"#;
        let parsed = parse_classifier_output(truncated).expect("recovery");
        assert_eq!(parsed.role.job_subfamily.as_deref(), Some("ml_engineer"));
        assert_eq!(parsed.role.seniority, None);
    }

    #[test]
    fn unrecoverable_garbage_is_invalid_json() {
        let result = parse_classifier_output("the role is a data engineer");
        assert!(matches!(result, Err(ClassifyError::InvalidJson(_))));
    }

    #[test]
    fn wrong_shape_is_a_schema_violation() {
        let result = parse_classifier_output(r#"{"skills": "Python"}"#);
        assert!(matches!(result, Err(ClassifyError::SchemaViolation(_))));
    }
}
