//! Ashby Posting API adapter.
//!
//! `GET /posting-api/job-board/{slug}?includeCompensation=true`. Ashby ships
//! compensation in three shapes depending on the board's configuration, so
//! extraction tries each in turn.

use std::time::Duration;

use async_trait::async_trait;
use jobsweep_core::{DataSource, EmployerRef, RawPosting, SourceHints, StructuredLocation};
use jobsweep_storage::HttpFetcher;
use serde::Deserialize;

use crate::filters::{strip_html, FilterSet};
use crate::{describe_fetch_error, FetchStats, SourceAdapter};

const ASHBY_API_URL: &str = "https://api.ashbyhq.com/posting-api/job-board";
const PACE: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct BoardResponse {
    #[serde(default)]
    jobs: Vec<AshbyPosting>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AshbyPosting {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    secondary_locations: Vec<AshbySecondaryLocation>,
    #[serde(default)]
    department: Option<String>,
    #[serde(default)]
    team: Option<String>,
    #[serde(default)]
    employment_type: Option<String>,
    #[serde(default)]
    is_remote: bool,
    #[serde(default)]
    description_plain: Option<String>,
    #[serde(default)]
    description_html: Option<String>,
    #[serde(default)]
    job_url: Option<String>,
    #[serde(default)]
    address: Option<AshbyAddress>,
    #[serde(default)]
    compensation: Option<AshbyCompensation>,
}

#[derive(Debug, Deserialize)]
struct AshbySecondaryLocation {
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AshbyAddress {
    #[serde(default)]
    postal_address: Option<AshbyPostalAddress>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AshbyPostalAddress {
    #[serde(default)]
    address_locality: Option<String>,
    #[serde(default)]
    address_region: Option<String>,
    #[serde(default)]
    address_country: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AshbyCompensation {
    #[serde(default)]
    compensation_tiers: Vec<AshbyTier>,
    #[serde(default)]
    summary_components: Vec<AshbyComponent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AshbyTier {
    #[serde(default)]
    salary_range: Option<AshbySalaryRange>,
    #[serde(default)]
    components: Vec<AshbyComponent>,
}

#[derive(Debug, Deserialize)]
struct AshbySalaryRange {
    #[serde(default)]
    min: Option<AshbyMoney>,
    #[serde(default)]
    max: Option<AshbyMoney>,
}

#[derive(Debug, Deserialize)]
struct AshbyMoney {
    #[serde(default)]
    value: Option<f64>,
    #[serde(default)]
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AshbyComponent {
    #[serde(default)]
    compensation_type: Option<String>,
    #[serde(default)]
    min_value: Option<f64>,
    #[serde(default)]
    max_value: Option<f64>,
    #[serde(default)]
    currency_code: Option<String>,
}

#[derive(Debug, Default, PartialEq)]
struct ParsedCompensation {
    min: Option<f64>,
    max: Option<f64>,
    currency: Option<String>,
}

fn salary_component(components: &[AshbyComponent]) -> Option<ParsedCompensation> {
    components
        .iter()
        .find(|c| c.compensation_type.as_deref() == Some("Salary"))
        .map(|c| ParsedCompensation {
            min: c.min_value,
            max: c.max_value,
            currency: c.currency_code.clone(),
        })
}

/// Three extraction methods, tried in order: tier `salaryRange`, tier
/// `components` with `compensationType == "Salary"`, then top-level
/// `summaryComponents`.
fn parse_compensation(comp: Option<&AshbyCompensation>) -> ParsedCompensation {
    let Some(comp) = comp else {
        return ParsedCompensation::default();
    };

    if let Some(tier) = comp.compensation_tiers.first() {
        if let Some(range) = &tier.salary_range {
            let min = range.min.as_ref().and_then(|m| m.value);
            let max = range.max.as_ref().and_then(|m| m.value);
            if min.is_some() || max.is_some() {
                let currency = range
                    .min
                    .as_ref()
                    .and_then(|m| m.currency.clone())
                    .or_else(|| range.max.as_ref().and_then(|m| m.currency.clone()));
                return ParsedCompensation { min, max, currency };
            }
        }
        if let Some(parsed) = salary_component(&tier.components) {
            return parsed;
        }
    }

    salary_component(&comp.summary_components).unwrap_or_default()
}

fn location_string(posting: &AshbyPosting) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(primary) = &posting.location {
        if !primary.is_empty() {
            parts.push(primary.clone());
        }
    }
    for secondary in &posting.secondary_locations {
        if let Some(location) = &secondary.location {
            if !location.is_empty() && !parts.contains(location) {
                parts.push(location.clone());
            }
        }
    }
    parts.join(" / ")
}

pub struct AshbyAdapter;

#[async_trait]
impl SourceAdapter for AshbyAdapter {
    fn source(&self) -> DataSource {
        DataSource::Ashby
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
            "{ASHBY_API_URL}/{}?includeCompensation=true",
            employer.slug
        );

        let response = match http.get(self.source(), &url, self.pace()).await {
            Ok(response) => response,
            Err(err) => return (Vec::new(), FetchStats::failed(describe_fetch_error(&err))),
        };

        let board: BoardResponse = match serde_json::from_slice(&response.body) {
            Ok(board) => board,
            Err(_) => return (Vec::new(), FetchStats::failed("Invalid response format")),
        };

        stats.jobs_fetched = board.jobs.len();
        let mut postings = Vec::new();

        for posting in board.jobs {
            let location = location_string(&posting);

            if !filters.is_relevant_role(&posting.title) {
                stats.filtered_by_title += 1;
                continue;
            }
            if !filters.matches_target_location(&location) {
                stats.filtered_by_location += 1;
                continue;
            }
            let Some(posting_url) = posting.job_url.clone().filter(|u| !u.is_empty()) else {
                continue;
            };

            let comp = parse_compensation(posting.compensation.as_ref());
            let raw_text = match &posting.description_plain {
                Some(plain) if !plain.is_empty() => {
                    plain.split_whitespace().collect::<Vec<_>>().join(" ")
                }
                _ => posting
                    .description_html
                    .as_deref()
                    .map(strip_html)
                    .unwrap_or_default(),
            };

            let structured = posting
                .address
                .as_ref()
                .and_then(|a| a.postal_address.as_ref())
                .map(|a| StructuredLocation {
                    city: a.address_locality.clone(),
                    region: a.address_region.clone(),
                    country: a.address_country.clone(),
                });

            postings.push(
                RawPosting {
                    source: DataSource::Ashby,
                    posting_url,
                    source_job_id: Some(posting.id),
                    title: posting.title,
                    company: employer.display_name.clone(),
                    location,
                    raw_text,
                    city_hint: None,
                    content_hash: String::new(),
                    hints: SourceHints {
                        company_slug: Some(employer.slug.clone()),
                        department: posting.department,
                        team: posting.team,
                        commitment: posting.employment_type,
                        is_remote: Some(posting.is_remote),
                        salary_min: comp.min,
                        salary_max: comp.max,
                        salary_currency: comp.currency,
                        locations: structured.into_iter().collect(),
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

    #[test]
    fn compensation_method_one_reads_tier_salary_range() {
        let comp: AshbyCompensation = serde_json::from_str(
            r#"{
                "compensationTiers": [{
                    "salaryRange": {
                        "min": {"value": 80000, "currency": "GBP"},
                        "max": {"value": 110000, "currency": "GBP"}
                    }
                }]
            }"#,
        )
        .expect("parse");
        let parsed = parse_compensation(Some(&comp));
        assert_eq!(parsed.min, Some(80_000.0));
        assert_eq!(parsed.max, Some(110_000.0));
        assert_eq!(parsed.currency.as_deref(), Some("GBP"));
    }

    #[test]
    fn compensation_method_two_reads_tier_components() {
        let comp: AshbyCompensation = serde_json::from_str(
            r#"{
                "compensationTiers": [{
                    "components": [
                        {"compensationType": "EquityPercentage", "minValue": 0.1},
                        {"compensationType": "Salary", "minValue": 150000,
                         "maxValue": 200000, "currencyCode": "USD"}
                    ]
                }]
            }"#,
        )
        .expect("parse");
        let parsed = parse_compensation(Some(&comp));
        assert_eq!(parsed.min, Some(150_000.0));
        assert_eq!(parsed.currency.as_deref(), Some("USD"));
    }

    #[test]
    fn compensation_method_three_reads_summary_components() {
        let comp: AshbyCompensation = serde_json::from_str(
            r#"{
                "summaryComponents": [
                    {"compensationType": "Salary", "minValue": 120000,
                     "maxValue": 160000, "currencyCode": "USD"}
                ]
            }"#,
        )
        .expect("parse");
        let parsed = parse_compensation(Some(&comp));
        assert_eq!(parsed.max, Some(160_000.0));
    }

    #[test]
    fn absent_compensation_is_empty() {
        assert_eq!(parse_compensation(None), ParsedCompensation::default());
    }

    #[test]
    fn secondary_locations_are_joined_and_deduplicated() {
        let posting: AshbyPosting = serde_json::from_str(
            r#"{
                "id": "ash-1",
                "title": "Senior Data Engineer",
                "location": "London, UK",
                "secondaryLocations": [
                    {"location": "London, UK"},
                    {"location": "Dublin, Ireland"}
                ]
            }"#,
        )
        .expect("parse");
        assert_eq!(location_string(&posting), "London, UK / Dublin, Ireland");
    }
}
