//! Workable Accounts API adapter.
//!
//! `GET /api/accounts/{slug}?details=true`. Newer accounts expose a
//! `workplace_type` enum; older ones only a `telecommuting` boolean, which
//! is mapped to remote/on_site.

use std::time::Duration;

use async_trait::async_trait;
use jobsweep_core::{DataSource, EmployerRef, RawPosting, SourceHints, StructuredLocation};
use jobsweep_storage::HttpFetcher;
use serde::Deserialize;

use crate::filters::{strip_html, FilterSet};
use crate::{describe_fetch_error, FetchStats, SourceAdapter};

const WORKABLE_API_URL: &str = "https://www.workable.com/api/accounts";
const PACE: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct AccountResponse {
    #[serde(default)]
    jobs: Vec<WorkableJob>,
}

#[derive(Debug, Deserialize)]
struct WorkableJob {
    #[serde(default)]
    title: String,
    #[serde(default)]
    shortcode: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    employment_type: Option<String>,
    #[serde(default)]
    workplace_type: Option<String>,
    #[serde(default)]
    telecommuting: bool,
    #[serde(default)]
    salary: Option<WorkableSalary>,
    #[serde(default)]
    location: Option<WorkableLocation>,
    #[serde(default)]
    locations: Vec<WorkableLocationEntry>,
}

#[derive(Debug, Deserialize)]
struct WorkableSalary {
    #[serde(default)]
    salary_from: Option<f64>,
    #[serde(default)]
    salary_to: Option<f64>,
    #[serde(default)]
    salary_currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorkableLocation {
    /// Pre-formatted display string some accounts supply.
    #[serde(default)]
    location_str: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    country_code: Option<String>,
    #[serde(default, alias = "state")]
    region: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkableLocationEntry {
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    country_code: Option<String>,
}

/// Prefer the explicit enum, fall back to the legacy boolean.
fn workplace_type(job: &WorkableJob) -> String {
    match &job.workplace_type {
        Some(explicit) if !explicit.is_empty() => explicit.clone(),
        _ => {
            if job.telecommuting {
                "remote".to_string()
            } else {
                "on_site".to_string()
            }
        }
    }
}

/// Nested location first, locations array as fallback.
fn country_code(job: &WorkableJob) -> Option<String> {
    job.location
        .as_ref()
        .and_then(|l| l.country_code.clone())
        .or_else(|| job.locations.first().and_then(|l| l.country_code.clone()))
}

/// Prefer the API's pre-formatted `location_str`; otherwise join city,
/// region, country.
fn location_string(job: &WorkableJob) -> String {
    let Some(location) = &job.location else {
        return String::new();
    };
    if let Some(preformatted) = location.location_str.as_deref() {
        if !preformatted.is_empty() {
            return preformatted.to_string();
        }
    }
    [
        location.city.as_deref(),
        location.region.as_deref(),
        location.country.as_deref(),
    ]
    .into_iter()
    .flatten()
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join(", ")
}

pub struct WorkableAdapter;

#[async_trait]
impl SourceAdapter for WorkableAdapter {
    fn source(&self) -> DataSource {
        DataSource::Workable
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
        let url = format!("{WORKABLE_API_URL}/{}?details=true", employer.slug);

        let response = match http.get(self.source(), &url, self.pace()).await {
            Ok(response) => response,
            Err(err) => return (Vec::new(), FetchStats::failed(describe_fetch_error(&err))),
        };

        let account: AccountResponse = match serde_json::from_slice(&response.body) {
            Ok(account) => account,
            Err(_) => return (Vec::new(), FetchStats::failed("Invalid response format")),
        };

        stats.jobs_fetched = account.jobs.len();
        let mut postings = Vec::new();

        for job in account.jobs {
            let location = location_string(&job);

            if !filters.is_relevant_role(&job.title) {
                stats.filtered_by_title += 1;
                continue;
            }
            if !filters.matches_target_location(&location) {
                stats.filtered_by_location += 1;
                continue;
            }
            let Some(posting_url) = job.url.clone().filter(|u| !u.is_empty()) else {
                continue;
            };

            let arrangement = workplace_type(&job);
            let country = country_code(&job);
            let raw_text = job
                .description
                .as_deref()
                .map(strip_html)
                .unwrap_or_default();
            let structured = job.location.as_ref().map(|l| StructuredLocation {
                city: l.city.clone(),
                region: l.region.clone(),
                country: l.country_code.clone().or_else(|| l.country.clone()),
            });

            postings.push(
                RawPosting {
                    source: DataSource::Workable,
                    posting_url,
                    source_job_id: job.shortcode,
                    title: job.title,
                    company: employer.display_name.clone(),
                    location,
                    raw_text,
                    city_hint: None,
                    content_hash: String::new(),
                    hints: SourceHints {
                        company_slug: Some(employer.slug.clone()),
                        commitment: job.employment_type,
                        workplace_type: Some(arrangement),
                        country_code: country,
                        salary_min: job.salary.as_ref().and_then(|s| s.salary_from),
                        salary_max: job.salary.as_ref().and_then(|s| s.salary_to),
                        salary_currency: job
                            .salary
                            .as_ref()
                            .and_then(|s| s.salary_currency.clone()),
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
