//! Greenhouse Job Board API adapter.
//!
//! Single request per board: `GET /v1/boards/{slug}/jobs?content=true`.
//! Compensation arrives as `pay_input_ranges` in cents + currency.

use std::time::Duration;

use async_trait::async_trait;
use jobsweep_core::{DataSource, EmployerRef, RawPosting, SourceHints};
use jobsweep_storage::HttpFetcher;
use serde::Deserialize;

use crate::filters::{strip_html, FilterSet};
use crate::{describe_fetch_error, FetchStats, SourceAdapter};

const GREENHOUSE_API_URL: &str = "https://boards-api.greenhouse.io/v1/boards";
const PACE: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
struct BoardResponse {
    #[serde(default)]
    jobs: Vec<GreenhouseJob>,
}

#[derive(Debug, Deserialize)]
struct GreenhouseJob {
    id: Option<i64>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    location: Option<Named>,
    #[serde(default)]
    departments: Vec<Named>,
    #[serde(default)]
    absolute_url: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    pay_input_ranges: Option<Vec<GreenhousePayRange>>,
}

#[derive(Debug, Deserialize)]
struct Named {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct GreenhousePayRange {
    min_cents: Option<i64>,
    max_cents: Option<i64>,
    currency_type: Option<String>,
}

/// Cents → whole units, first range only (primary compensation).
fn parse_compensation(ranges: Option<&[GreenhousePayRange]>) -> (Option<f64>, Option<f64>, Option<String>) {
    let Some(range) = ranges.and_then(|r| r.first()) else {
        return (None, None, None);
    };
    (
        range.min_cents.map(|c| (c / 100) as f64),
        range.max_cents.map(|c| (c / 100) as f64),
        range.currency_type.clone(),
    )
}

pub struct GreenhouseAdapter;

#[async_trait]
impl SourceAdapter for GreenhouseAdapter {
    fn source(&self) -> DataSource {
        DataSource::Greenhouse
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
        let url = format!("{GREENHOUSE_API_URL}/{}/jobs?content=true", employer.slug);

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

        for job in board.jobs {
            let location = job
                .location
                .as_ref()
                .map(|l| l.name.clone())
                .unwrap_or_default();

            if !filters.is_relevant_role(&job.title) {
                stats.filtered_by_title += 1;
                continue;
            }
            if !filters.matches_target_location(&location) {
                stats.filtered_by_location += 1;
                continue;
            }
            if job.absolute_url.is_empty() {
                continue;
            }

            let (salary_min, salary_max, salary_currency) =
                parse_compensation(job.pay_input_ranges.as_deref());
            let raw_text = job
                .content
                .as_deref()
                .map(strip_html)
                .unwrap_or_default();

            postings.push(
                RawPosting {
                    source: DataSource::Greenhouse,
                    posting_url: job.absolute_url,
                    source_job_id: job.id.map(|id| id.to_string()),
                    title: job.title,
                    company: employer.display_name.clone(),
                    location,
                    raw_text,
                    city_hint: None,
                    content_hash: String::new(),
                    hints: SourceHints {
                        company_slug: Some(employer.slug.clone()),
                        department: job.departments.first().map(|d| d.name.clone()),
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
