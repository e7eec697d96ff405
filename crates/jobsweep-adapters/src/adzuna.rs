//! Adzuna aggregator client.
//!
//! Query-driven rather than slug-driven: one paginated search per configured
//! role query per city. The aggregator enforces ~25 requests/minute, so the
//! pace passed to the shared fetcher spaces calls 2.5 s apart (24/min).
//! Salary figures carry a `salary_is_predicted` flag; predicted numbers are
//! advisory only and the suppression table nulls Adzuna compensation on
//! write regardless.

use std::time::Duration;

use jobsweep_core::{DataSource, RawPosting, SourceHints};
use jobsweep_storage::HttpFetcher;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::filters::{strip_html, FilterSet};
use crate::{describe_fetch_error, FetchStats};

const ADZUNA_API_URL: &str = "https://api.adzuna.com/v1/api/jobs";
const RESULTS_PER_PAGE: usize = 50;
/// 60 s / 24 requests.
const PACE: Duration = Duration::from_millis(2500);

/// One sweep target for the aggregator.
#[derive(Debug, Clone)]
pub struct CityTarget {
    /// Short city code recorded on raw rows (`lon`, `nyc`, `den`).
    pub code: String,
    /// Adzuna country segment (`gb`, `us`).
    pub country: String,
    /// Human location passed as the `where` parameter.
    pub display: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<AdzunaJob>,
}

#[derive(Debug, Deserialize)]
struct AdzunaJob {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    redirect_url: Option<String>,
    #[serde(default)]
    company: Option<AdzunaCompany>,
    #[serde(default)]
    location: Option<AdzunaLocation>,
    #[serde(default)]
    category: Option<AdzunaCategory>,
    #[serde(default)]
    salary_min: Option<f64>,
    #[serde(default)]
    salary_max: Option<f64>,
    #[serde(default)]
    salary_is_predicted: Option<Value>,
    #[serde(default)]
    contract_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdzunaCompany {
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdzunaLocation {
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdzunaCategory {
    #[serde(default)]
    label: Option<String>,
}

/// The API returns the flag as the string "1"/"0" on most plans and as a
/// bare number on others.
fn parse_predicted(value: Option<&Value>) -> Option<bool> {
    match value {
        Some(Value::String(s)) => Some(s == "1"),
        Some(Value::Number(n)) => Some(n.as_i64() == Some(1)),
        Some(Value::Bool(b)) => Some(*b),
        _ => None,
    }
}

fn job_id(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

pub struct AdzunaClient {
    app_id: String,
    app_key: String,
    queries: Vec<String>,
}

impl AdzunaClient {
    pub fn new(app_id: String, app_key: String, queries: Vec<String>) -> Self {
        Self {
            app_id,
            app_key,
            queries,
        }
    }

    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    /// Estimated request count for one city sweep, for the pre-run log line.
    pub fn planned_requests(&self, max_per_query: usize) -> usize {
        let pages = max_per_query.div_ceil(RESULTS_PER_PAGE).max(1);
        self.queries.len() * pages
    }

    fn page_url(&self, city: &CityTarget, query: &str, page: usize) -> String {
        let base = format!("{ADZUNA_API_URL}/{}/search/{}", city.country, page);
        let url = reqwest::Url::parse_with_params(
            &base,
            &[
                ("app_id", self.app_id.as_str()),
                ("app_key", self.app_key.as_str()),
                ("what", query),
                ("where", city.display.as_str()),
                ("results_per_page", "50"),
                ("content-type", "application/json"),
            ],
        )
        .expect("static adzuna url is valid");
        url.into()
    }

    /// Paginated search across every configured query for one city.
    pub async fn fetch_city(
        &self,
        http: &HttpFetcher,
        city: &CityTarget,
        max_per_query: usize,
        filters: &FilterSet,
    ) -> (Vec<RawPosting>, FetchStats) {
        let mut stats = FetchStats::default();
        let mut postings = Vec::new();
        let pages = max_per_query.div_ceil(RESULTS_PER_PAGE).max(1);

        for query in &self.queries {
            let mut fetched_for_query = 0usize;

            for page in 1..=pages {
                let url = self.page_url(city, query, page);
                let response = match http.get(DataSource::Adzuna, &url, PACE).await {
                    Ok(response) => response,
                    Err(err) => {
                        stats.error = Some(describe_fetch_error(&err));
                        break;
                    }
                };

                let search: SearchResponse = match serde_json::from_slice(&response.body) {
                    Ok(search) => search,
                    Err(_) => {
                        stats.error = Some("Invalid response format".to_string());
                        break;
                    }
                };

                let page_count = search.results.len();
                stats.jobs_fetched += page_count;

                for job in search.results {
                    if fetched_for_query >= max_per_query {
                        break;
                    }
                    fetched_for_query += 1;

                    if !filters.is_relevant_role(&job.title) {
                        stats.filtered_by_title += 1;
                        continue;
                    }
                    let location = job
                        .location
                        .as_ref()
                        .and_then(|l| l.display_name.clone())
                        .unwrap_or_else(|| city.display.clone());
                    if !filters.matches_target_location(&location) {
                        stats.filtered_by_location += 1;
                        continue;
                    }

                    let id = job_id(job.id.as_ref());
                    let posting_url = job
                        .redirect_url
                        .clone()
                        .filter(|u| !u.is_empty())
                        .or_else(|| id.as_ref().map(|id| format!("adzuna-{id}")));
                    let Some(posting_url) = posting_url else {
                        continue;
                    };

                    postings.push(
                        RawPosting {
                            source: DataSource::Adzuna,
                            posting_url,
                            source_job_id: id,
                            title: job.title,
                            company: job
                                .company
                                .as_ref()
                                .and_then(|c| c.display_name.clone())
                                .unwrap_or_else(|| "Unknown Company".to_string()),
                            location,
                            raw_text: job
                                .description
                                .as_deref()
                                .map(strip_html)
                                .unwrap_or_default(),
                            city_hint: Some(city.code.clone()),
                            content_hash: String::new(),
                            hints: SourceHints {
                                category: job.category.as_ref().and_then(|c| c.label.clone()),
                                commitment: job.contract_type,
                                salary_min: job.salary_min,
                                salary_max: job.salary_max,
                                salary_is_predicted: parse_predicted(
                                    job.salary_is_predicted.as_ref(),
                                ),
                                ..SourceHints::default()
                            },
                        }
                        .seal(),
                    );
                }

                // A short page means the search is exhausted.
                if page_count < RESULTS_PER_PAGE || fetched_for_query >= max_per_query {
                    break;
                }
            }

            debug!(query, city = %city.code, fetched = fetched_for_query, "adzuna query done");
        }

        stats.jobs_kept = postings.len();
        (postings, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicted_flag_accepts_string_and_number_forms() {
        assert_eq!(parse_predicted(Some(&Value::String("1".into()))), Some(true));
        assert_eq!(
            parse_predicted(Some(&Value::String("0".into()))),
            Some(false)
        );
        assert_eq!(parse_predicted(Some(&serde_json::json!(1))), Some(true));
        assert_eq!(parse_predicted(None), None);
    }

    #[test]
    fn job_ids_normalize_to_strings() {
        assert_eq!(
            job_id(Some(&Value::String("4567".into()))),
            Some("4567".to_string())
        );
        assert_eq!(job_id(Some(&serde_json::json!(4567))), Some("4567".to_string()));
        assert_eq!(job_id(None), None);
    }

    #[test]
    fn search_response_parses_real_shape() {
        let search: SearchResponse = serde_json::from_str(
            r#"{
                "results": [{
                    "id": "5001",
                    "title": "Machine Learning Engineer",
                    "description": "Train models...",
                    "redirect_url": "https://www.adzuna.co.uk/jobs/details/5001",
                    "company": {"display_name": "DeepStart"},
                    "location": {"display_name": "London, UK"},
                    "category": {"label": "IT Jobs"},
                    "salary_min": 65000,
                    "salary_max": 90000,
                    "salary_is_predicted": "1"
                }]
            }"#,
        )
        .expect("parse");
        let job = &search.results[0];
        assert_eq!(job.category.as_ref().and_then(|c| c.label.clone()).as_deref(), Some("IT Jobs"));
        assert_eq!(parse_predicted(job.salary_is_predicted.as_ref()), Some(true));
    }

    #[test]
    fn planned_requests_scale_with_pages_and_queries() {
        let client = AdzunaClient::new(
            "id".into(),
            "key".into(),
            vec!["data engineer".into(), "product manager".into()],
        );
        assert_eq!(client.planned_requests(50), 2);
        assert_eq!(client.planned_requests(120), 6);
    }

    #[test]
    fn page_urls_are_percent_encoded() {
        let client = AdzunaClient::new("id".into(), "key".into(), vec![]);
        let city = CityTarget {
            code: "lon".into(),
            country: "gb".into(),
            display: "London".into(),
        };
        let url = client.page_url(&city, "data engineer", 2);
        assert!(url.starts_with("https://api.adzuna.com/v1/api/jobs/gb/search/2?"));
        assert!(url.contains("what=data+engineer") || url.contains("what=data%20engineer"));
        assert!(url.contains("where=London"));
    }
}
