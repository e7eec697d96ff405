//! Google Careers XML feed adapter.
//!
//! One feed URL for the whole board. Despite the `.xml` extension this is
//! not RSS; it is a custom schema:
//!
//! ```text
//! <jobs>
//!   <job>
//!     <jobid>123456</jobid>
//!     <title>...</title>
//!     <description>...</description>
//!     <url>...</url>
//!     <locations><location><city/><country/></location></locations>
//!   </job>
//! </jobs>
//! ```
//!
//! Salary is not structured; a `$141,000 - $202,000` style range is parsed
//! out of the description when present (US postings, USD).

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use jobsweep_core::{DataSource, EmployerRef, RawPosting, SourceHints, StructuredLocation};
use jobsweep_storage::HttpFetcher;
use regex::Regex;
use serde::Deserialize;

use crate::filters::{strip_html, FilterSet};
use crate::{describe_fetch_error, FetchStats, SourceAdapter};

const GOOGLE_FEED_URL: &str =
    "https://www.google.com/about/careers/applications/jobs/feed.xml";
const PACE: Duration = Duration::from_millis(300);

#[derive(Debug, Deserialize)]
struct JobsFeed {
    #[serde(rename = "job", default)]
    jobs: Vec<FeedJob>,
}

#[derive(Debug, Deserialize)]
struct FeedJob {
    #[serde(default)]
    jobid: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    locations: Option<FeedLocations>,
}

#[derive(Debug, Deserialize)]
struct FeedLocations {
    #[serde(rename = "location", default)]
    entries: Vec<FeedLocation>,
}

#[derive(Debug, Deserialize)]
struct FeedLocation {
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

fn salary_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$(\d{1,3}(?:,\d{3})*)\s*[-\u{2013}]\s*\$(\d{1,3}(?:,\d{3})*)")
            .expect("salary pattern compiles")
    })
}

/// `$141,000-$202,000` → (141000, 202000, USD).
fn extract_salary(description: &str) -> (Option<f64>, Option<f64>, Option<String>) {
    let Some(captures) = salary_regex().captures(description) else {
        return (None, None, None);
    };
    let parse = |group: usize| {
        captures
            .get(group)
            .and_then(|m| m.as_str().replace(',', "").parse::<f64>().ok())
    };
    match (parse(1), parse(2)) {
        (Some(min), Some(max)) => (Some(min), Some(max), Some("USD".to_string())),
        _ => (None, None, None),
    }
}

fn location_strings(locations: Option<&FeedLocations>) -> Vec<String> {
    let Some(locations) = locations else {
        return Vec::new();
    };
    locations
        .entries
        .iter()
        .filter_map(|entry| {
            let parts: Vec<&str> = [
                entry.city.as_deref(),
                entry.state.as_deref(),
                entry.country.as_deref(),
            ]
            .into_iter()
            .flatten()
            .filter(|p| !p.is_empty())
            .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        })
        .collect()
}

pub struct GoogleFeedAdapter;

#[async_trait]
impl SourceAdapter for GoogleFeedAdapter {
    fn source(&self) -> DataSource {
        DataSource::Google
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

        let response = match http.get(self.source(), GOOGLE_FEED_URL, self.pace()).await {
            Ok(response) => response,
            Err(err) => return (Vec::new(), FetchStats::failed(describe_fetch_error(&err))),
        };

        let feed: JobsFeed = match quick_xml::de::from_str(&response.text()) {
            Ok(feed) => feed,
            Err(_) => return (Vec::new(), FetchStats::failed("Invalid response format")),
        };

        stats.jobs_fetched = feed.jobs.len();
        let mut postings = Vec::new();

        for job in feed.jobs {
            let location_list = location_strings(job.locations.as_ref());
            let location = location_list.join(" / ");

            if !filters.is_relevant_role(&job.title) {
                stats.filtered_by_title += 1;
                continue;
            }
            if !filters.matches_target_location(&location) {
                stats.filtered_by_location += 1;
                continue;
            }

            let posting_url = job
                .url
                .clone()
                .filter(|u| !u.is_empty())
                .or_else(|| job.jobid.as_ref().map(|id| format!("google-{id}")));
            let Some(posting_url) = posting_url else {
                continue;
            };

            let raw_text = job
                .description
                .as_deref()
                .map(strip_html)
                .unwrap_or_default();
            let (salary_min, salary_max, salary_currency) = extract_salary(&raw_text);

            let structured: Vec<StructuredLocation> = job
                .locations
                .as_ref()
                .map(|locations| {
                    locations
                        .entries
                        .iter()
                        .map(|entry| StructuredLocation {
                            city: entry.city.clone(),
                            region: entry.state.clone(),
                            country: entry.country.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default();

            postings.push(
                RawPosting {
                    source: DataSource::Google,
                    posting_url,
                    source_job_id: job.jobid,
                    title: job.title,
                    company: employer.display_name.clone(),
                    location,
                    raw_text,
                    city_hint: None,
                    content_hash: String::new(),
                    hints: SourceHints {
                        company_slug: Some(employer.slug.clone()),
                        salary_min,
                        salary_max,
                        salary_currency,
                        locations: structured,
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

    const SAMPLE: &str = r#"
        <jobs>
          <job>
            <jobid>123456</jobid>
            <title>Senior Data Engineer</title>
            <description>&lt;p&gt;The US base salary range for this full-time position is $141,000-$202,000 + bonus.&lt;/p&gt;</description>
            <url>https://www.google.com/about/careers/applications/jobs/results/123456</url>
            <locations>
              <location><city>London</city><country>UK</country></location>
              <location><city>Dublin</city><country>Ireland</country></location>
            </locations>
          </job>
        </jobs>"#;

    #[test]
    fn feed_parses_nested_locations() {
        let feed: JobsFeed = quick_xml::de::from_str(SAMPLE).expect("parse feed");
        assert_eq!(feed.jobs.len(), 1);
        let locations = location_strings(feed.jobs[0].locations.as_ref());
        assert_eq!(locations, vec!["London, UK", "Dublin, Ireland"]);
    }

    #[test]
    fn salary_range_is_parsed_from_description_text() {
        let (min, max, currency) = extract_salary(
            "The US base salary range for this full-time position is $141,000-$202,000 + bonus.",
        );
        assert_eq!(min, Some(141_000.0));
        assert_eq!(max, Some(202_000.0));
        assert_eq!(currency.as_deref(), Some("USD"));
    }

    #[test]
    fn en_dash_ranges_also_match() {
        let (min, max, _) = extract_salary("Pay: $90,000 \u{2013} $120,000 annually.");
        assert_eq!(min, Some(90_000.0));
        assert_eq!(max, Some(120_000.0));
    }

    #[test]
    fn descriptions_without_ranges_have_no_salary() {
        assert_eq!(extract_salary("Competitive pay."), (None, None, None));
    }
}
