//! Recruitment agency detection.
//!
//! Stage A is a pure name classifier over config-driven lists; stage B adds
//! description phrase scanning and reconciles with the classifier's own
//! verdict. Hard (high-confidence) matches skip classification entirely.

use std::collections::HashSet;

use jobsweep_core::{AgencyConfidence, AgencyVerdict};
use serde::Deserialize;

/// Recruitment-theme tokens that make a medium suffix suspicious.
const RECRUITMENT_THEME: [&str; 4] = ["talent", "staffing", "recruit", "search"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgencyRules {
    #[serde(default)]
    pub hard_filter: Vec<String>,
    #[serde(default)]
    pub legitimate_companies: Vec<String>,
    #[serde(default)]
    pub high_confidence_keywords: Vec<String>,
    #[serde(default)]
    pub medium_confidence_keywords: Vec<String>,
    #[serde(default)]
    pub high_confidence_suffixes: Vec<String>,
    #[serde(default)]
    pub medium_confidence_suffixes: Vec<String>,
    #[serde(default)]
    pub agency_phrases: Vec<String>,
}

#[derive(Debug)]
pub struct AgencyDetector {
    hard_filter: HashSet<String>,
    legitimate: HashSet<String>,
    high_keywords: Vec<String>,
    medium_keywords: Vec<String>,
    high_suffixes: Vec<String>,
    medium_suffixes: Vec<String>,
    phrases: Vec<String>,
}

fn lowered(values: &[String]) -> Vec<String> {
    values.iter().map(|v| v.to_lowercase()).collect()
}

fn ends_with_word(name: &str, suffix: &str) -> bool {
    name == suffix || name.ends_with(&format!(" {suffix}"))
}

impl AgencyDetector {
    pub fn new(rules: AgencyRules) -> Self {
        Self {
            hard_filter: rules.hard_filter.iter().map(|v| v.to_lowercase()).collect(),
            legitimate: rules
                .legitimate_companies
                .iter()
                .map(|v| v.to_lowercase())
                .collect(),
            high_keywords: lowered(&rules.high_confidence_keywords),
            medium_keywords: lowered(&rules.medium_confidence_keywords),
            high_suffixes: lowered(&rules.high_confidence_suffixes),
            medium_suffixes: lowered(&rules.medium_confidence_suffixes),
            phrases: lowered(&rules.agency_phrases),
        }
    }

    /// Stage A, optionally widened with description phrases (stage B input).
    pub fn detect(&self, employer_name: &str, description: Option<&str>) -> AgencyVerdict {
        let name = employer_name.trim().to_lowercase();
        if name.is_empty() {
            return AgencyVerdict::NOT_AGENCY;
        }
        if self.legitimate.contains(&name) {
            return AgencyVerdict::NOT_AGENCY;
        }
        if self.hard_filter.contains(&name) {
            return AgencyVerdict::agency(AgencyConfidence::High);
        }

        let high_hits = self
            .high_keywords
            .iter()
            .filter(|k| name.contains(k.as_str()))
            .count();
        let high_suffix = self
            .high_suffixes
            .iter()
            .any(|s| ends_with_word(&name, s));
        if high_hits >= 2 || high_suffix {
            return AgencyVerdict::agency(AgencyConfidence::High);
        }

        let medium_hits = self
            .medium_keywords
            .iter()
            .filter(|k| name.contains(k.as_str()))
            .count();
        let medium_suffix = self
            .medium_suffixes
            .iter()
            .any(|s| ends_with_word(&name, s));
        let recruitment_theme = RECRUITMENT_THEME.iter().any(|t| name.contains(t));

        let name_is_medium =
            high_hits == 1 || (medium_suffix && recruitment_theme) || medium_hits >= 2;

        if let Some(description) = description {
            let description = description.to_lowercase();
            let phrase_hits = self
                .phrases
                .iter()
                .filter(|p| description.contains(p.as_str()))
                .count();
            if phrase_hits >= 2 || (phrase_hits >= 1 && medium_hits >= 1) {
                return AgencyVerdict::agency(AgencyConfidence::Medium);
            }
        }

        if name_is_medium {
            return AgencyVerdict::agency(AgencyConfidence::Medium);
        }
        AgencyVerdict::NOT_AGENCY
    }

    /// Pre-classification hard filter: only high-confidence name matches
    /// drop a posting before the classifier sees it.
    pub fn is_hard_agency(&self, employer_name: &str) -> bool {
        let verdict = self.detect(employer_name, None);
        verdict.is_agency && verdict.confidence == AgencyConfidence::High
    }

    /// Stage B combination with the classifier's own agency verdict.
    ///
    /// High pattern beats everything; a medium pattern needs classifier
    /// agreement to upgrade and defers when contradicted; a low pattern
    /// defers outright.
    pub fn combine(
        &self,
        pattern: AgencyVerdict,
        classifier: Option<AgencyVerdict>,
    ) -> AgencyVerdict {
        if pattern.is_agency && pattern.confidence == AgencyConfidence::High {
            return pattern;
        }
        if pattern.is_agency && pattern.confidence == AgencyConfidence::Medium {
            return match classifier {
                Some(verdict) if verdict.is_agency => {
                    AgencyVerdict::agency(AgencyConfidence::High)
                }
                Some(_) => AgencyVerdict::NOT_AGENCY,
                None => pattern,
            };
        }
        classifier.unwrap_or(AgencyVerdict::NOT_AGENCY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> AgencyDetector {
        AgencyDetector::new(AgencyRules {
            hard_filter: vec!["hays".into(), "robert half".into(), "michael page".into()],
            legitimate_companies: vec![
                "accenture".into(),
                "google".into(),
                "boston consulting group".into(),
            ],
            high_confidence_keywords: vec![
                "staffing".into(),
                "recruitment".into(),
                "headhunt".into(),
            ],
            medium_confidence_keywords: vec![
                "consulting".into(),
                "global".into(),
                "talent".into(),
            ],
            high_confidence_suffixes: vec!["staffing".into(), "recruitment".into()],
            medium_confidence_suffixes: vec!["solutions".into(), "search".into()],
            agency_phrases: vec![
                "our client".into(),
                "is seeking".into(),
                "exciting opportunity".into(),
            ],
        })
    }

    #[test]
    fn hard_filter_matches_are_high_and_case_insensitive() {
        let detector = detector();
        let verdict = detector.detect("HAYS", None);
        assert!(verdict.is_agency);
        assert_eq!(verdict.confidence, AgencyConfidence::High);
        assert!(detector.is_hard_agency("Hays"));
    }

    #[test]
    fn two_high_keywords_or_high_suffix_are_high() {
        let detector = detector();
        let verdict = detector.detect("Tech Staffing Recruitment Group", None);
        assert_eq!(verdict, AgencyVerdict::agency(AgencyConfidence::High));

        let verdict = detector.detect("Hays Recruitment", None);
        assert_eq!(verdict, AgencyVerdict::agency(AgencyConfidence::High));
    }

    #[test]
    fn single_high_keyword_is_medium_and_not_hard_filtered() {
        let detector = detector();
        let verdict = detector.detect("Global Staffing Inc", None);
        assert_eq!(verdict, AgencyVerdict::agency(AgencyConfidence::Medium));
        assert!(!detector.is_hard_agency("Global Staffing Inc"));
    }

    #[test]
    fn medium_suffix_needs_a_recruitment_theme() {
        let detector = detector();
        assert_eq!(
            detector.detect("Talent Search Solutions", None),
            AgencyVerdict::agency(AgencyConfidence::Medium)
        );
        assert!(!detector.detect("Acme Solutions", None).is_agency);
    }

    #[test]
    fn two_medium_keywords_are_medium() {
        let detector = detector();
        assert_eq!(
            detector.detect("Apex Consulting Global", None),
            AgencyVerdict::agency(AgencyConfidence::Medium)
        );
    }

    #[test]
    fn legitimate_companies_override_keyword_matches() {
        let detector = detector();
        assert!(!detector.detect("Boston Consulting Group", None).is_agency);
        assert!(!detector.detect("google", None).is_agency);
    }

    #[test]
    fn empty_and_plain_names_pass() {
        let detector = detector();
        assert!(!detector.detect("", None).is_agency);
        assert!(!detector.detect("Stripe", None).is_agency);
    }

    #[test]
    fn two_description_phrases_upgrade_to_medium() {
        let detector = detector();
        let description =
            "Our client, a leading technology company, is seeking a Data Scientist.";
        assert_eq!(
            detector.detect("Unknown Corp", Some(description)),
            AgencyVerdict::agency(AgencyConfidence::Medium)
        );
    }

    #[test]
    fn one_phrase_plus_a_medium_name_keyword_flags() {
        let detector = detector();
        let description = "Our client needs a talented engineer.";
        assert!(
            detector
                .detect("DataTech Consulting", Some(description))
                .is_agency
        );
    }

    #[test]
    fn clean_descriptions_do_not_trigger() {
        let detector = detector();
        let description = "We are building a data platform with Python and Spark.";
        assert!(!detector.detect("Normal Corp", Some(description)).is_agency);
    }

    #[test]
    fn combine_high_pattern_beats_classifier() {
        let detector = detector();
        let combined = detector.combine(
            AgencyVerdict::agency(AgencyConfidence::High),
            Some(AgencyVerdict::NOT_AGENCY),
        );
        assert_eq!(combined, AgencyVerdict::agency(AgencyConfidence::High));
    }

    #[test]
    fn combine_medium_pattern_with_agreement_is_high() {
        let detector = detector();
        let combined = detector.combine(
            AgencyVerdict::agency(AgencyConfidence::Medium),
            Some(AgencyVerdict::agency(AgencyConfidence::Medium)),
        );
        assert_eq!(combined, AgencyVerdict::agency(AgencyConfidence::High));
    }

    #[test]
    fn combine_medium_pattern_with_disagreement_defers() {
        let detector = detector();
        let combined = detector.combine(
            AgencyVerdict::agency(AgencyConfidence::Medium),
            Some(AgencyVerdict::NOT_AGENCY),
        );
        assert_eq!(combined, AgencyVerdict::NOT_AGENCY);
    }

    #[test]
    fn combine_low_pattern_defers_to_classifier() {
        let detector = detector();
        let combined = detector.combine(
            AgencyVerdict::NOT_AGENCY,
            Some(AgencyVerdict::agency(AgencyConfidence::Medium)),
        );
        assert_eq!(combined, AgencyVerdict::agency(AgencyConfidence::Medium));

        let combined = detector.combine(AgencyVerdict::NOT_AGENCY, None);
        assert_eq!(combined, AgencyVerdict::NOT_AGENCY);
    }
}
