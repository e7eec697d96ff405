//! Lever Postings API adapter.
//!
//! `GET /v0/postings/{slug}?mode=json` on the global or EU host, selected by
//! the employer's `instance`. The response is a bare JSON array.

use std::time::Duration;

use async_trait::async_trait;
use jobsweep_core::{DataSource, EmployerRef, RawPosting, SourceHints};
use jobsweep_storage::HttpFetcher;
use serde::Deserialize;

use crate::filters::{strip_html, FilterSet};
use crate::{describe_fetch_error, FetchStats, SourceAdapter};

const PACE: Duration = Duration::from_millis(800);

fn api_host(instance: Option<&str>) -> &'static str {
    match instance {
        Some("eu") => "https://api.eu.lever.co/v0/postings",
        _ => "https://api.lever.co/v0/postings",
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeverPosting {
    id: String,
    /// Job title.
    #[serde(default)]
    text: String,
    #[serde(default)]
    categories: Option<LeverCategories>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    description_plain: Option<String>,
    #[serde(default)]
    hosted_url: Option<String>,
    /// on-site, remote, hybrid, unspecified.
    #[serde(default)]
    workplace_type: Option<String>,
    #[serde(default)]
    salary_range: Option<LeverSalaryRange>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeverCategories {
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    all_locations: Option<Vec<String>>,
    #[serde(default)]
    commitment: Option<String>,
    #[serde(default)]
    team: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeverSalaryRange {
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    min: Option<f64>,
    #[serde(default)]
    max: Option<f64>,
}

/// Primary location plus any `allLocations` extras, joined for filtering.
fn location_string(categories: Option<&LeverCategories>) -> String {
    let Some(categories) = categories else {
        return String::new();
    };
    let mut parts: Vec<String> = Vec::new();
    if let Some(location) = &categories.location {
        if !location.is_empty() {
            parts.push(location.clone());
        }
    }
    if let Some(extra) = &categories.all_locations {
        for location in extra {
            if !location.is_empty() && !parts.contains(location) {
                parts.push(location.clone());
            }
        }
    }
    parts.join(" / ")
}

pub struct LeverAdapter;

#[async_trait]
impl SourceAdapter for LeverAdapter {
    fn source(&self) -> DataSource {
        DataSource::Lever
    }

    fn pace(&self) -> Duration {
        PACE
    }

    async fn fetch_board(
        &self,
        http: &HttpFetcher,
        employer: &EmployerRef,
        filters: &FilterSet,
    ) -> (Vec<RawPosting>, FetchStats) {
        let mut stats = FetchStats::default();
        let url = format!(
            "{}/{}?mode=json",
            api_host(employer.instance.as_deref()),
            employer.slug
        );

        let response = match http.get(self.source(), &url, self.pace()).await {
            Ok(response) => response,
            Err(err) => return (Vec::new(), FetchStats::failed(describe_fetch_error(&err))),
        };

        let board: Vec<LeverPosting> = match serde_json::from_slice(&response.body) {
            Ok(board) => board,
            Err(_) => return (Vec::new(), FetchStats::failed("Invalid response format")),
        };

        stats.jobs_fetched = board.len();
        let mut postings = Vec::new();

        for posting in board {
            let location = location_string(posting.categories.as_ref());

            if !filters.is_relevant_role(&posting.text) {
                stats.filtered_by_title += 1;
                continue;
            }
            if !filters.matches_target_location(&location) {
                stats.filtered_by_location += 1;
                continue;
            }
            // No hosted URL means no stable identity; skip.
            let Some(posting_url) = posting.hosted_url.filter(|u| !u.is_empty()) else {
                continue;
            };

            let raw_text = match &posting.description_plain {
                Some(plain) if !plain.is_empty() => {
                    plain.split_whitespace().collect::<Vec<_>>().join(" ")
                }
                _ => posting
                    .description
                    .as_deref()
                    .map(strip_html)
                    .unwrap_or_default(),
            };

            let (salary_min, salary_max, salary_currency) = posting
                .salary_range
                .as_ref()
                .map(|range| (range.min, range.max, range.currency.clone()))
                .unwrap_or((None, None, None));

            postings.push(
                RawPosting {
                    source: DataSource::Lever,
                    posting_url,
                    source_job_id: Some(posting.id),
                    title: posting.text,
                    company: employer.display_name.clone(),
                    location,
                    raw_text,
                    city_hint: None,
                    content_hash: String::new(),
                    hints: SourceHints {
                        company_slug: Some(employer.slug.clone()),
                        team: posting
                            .categories
                            .as_ref()
                            .and_then(|c| c.team.clone()),
                        commitment: posting
                            .categories
                            .as_ref()
                            .and_then(|c| c.commitment.clone()),
                        workplace_type: posting.workplace_type,
                        country_code: posting.country,
                        salary_min,
                        salary_max,
                        salary_currency,
                        ..SourceHints::default()
                    },
                }
                .seal(),
            );
        }

        stats.jobs_kept = postings.len();
        (postings, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        {
            "id": "lev-1",
            "text": "Staff Data Scientist",
            "categories": {
                "location": "London",
                "allLocations": ["London", "Remote - UK"],
                "commitment": "Full-time",
                "team": "Analytics"
            },
            "country": "GB",
            "descriptionPlain": "Ship models  to production.",
            "hostedUrl": "https://jobs.lever.co/wise/lev-1",
            "workplaceType": "hybrid",
            "salaryRange": {"currency": "GBP", "min": 90000, "max": 120000}
        },
        {
            "id": "lev-2",
            "text": "Data Engineer",
            "categories": {"location": "Austin, TX"},
            "description": "<p>ETL things</p>",
            "hostedUrl": "https://jobs.lever.co/wise/lev-2",
            "workplaceType": "onsite"
        }
    ]"#;

    #[test]
    fn parses_postings_and_joins_all_locations() {
        let board: Vec<LeverPosting> = serde_json::from_str(SAMPLE).expect("parse");
        assert_eq!(board.len(), 2);
        assert_eq!(
            location_string(board[0].categories.as_ref()),
            "London / Remote - UK"
        );
        assert_eq!(board[0].workplace_type.as_deref(), Some("hybrid"));
        assert_eq!(
            board[0].salary_range.as_ref().and_then(|r| r.min),
            Some(90_000.0)
        );
    }

    #[test]
    fn missing_categories_yield_empty_location() {
        assert_eq!(location_string(None), "");
    }

    #[test]
    fn api_host_switches_on_instance() {
        assert_eq!(api_host(None), "https://api.lever.co/v0/postings");
        assert_eq!(api_host(Some("global")), "https://api.lever.co/v0/postings");
        assert_eq!(api_host(Some("eu")), "https://api.eu.lever.co/v0/postings");
    }
}
