//! SmartRecruiters Postings API adapter.
//!
//! List-then-detail: the company listing carries titles, locations, and
//! experience levels; descriptions require one detail request per posting,
//! so the cheap filters run on the listing before any detail fetch.

use std::time::Duration;

use async_trait::async_trait;
use jobsweep_core::{DataSource, EmployerRef, RawPosting, SourceHints, StructuredLocation};
use jobsweep_storage::HttpFetcher;
use serde::Deserialize;

use crate::filters::{strip_html, FilterSet};
use crate::{describe_fetch_error, FetchStats, SourceAdapter};

const SMARTRECRUITERS_API_URL: &str = "https://api.smartrecruiters.com/v1/companies";
const PACE: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct PostingList {
    #[serde(default)]
    content: Vec<PostingSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostingSummary {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    location: Option<SrLocation>,
    #[serde(default)]
    experience_level: Option<SrIdent>,
    #[serde(default)]
    type_of_employment: Option<SrIdent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SrLocation {
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    remote: bool,
}

#[derive(Debug, Deserialize)]
struct SrIdent {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    label: Option<String>,
}

impl SrIdent {
    fn value(&self) -> Option<String> {
        self.id.clone().or_else(|| self.label.clone())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostingDetail {
    #[serde(default)]
    job_ad: Option<JobAd>,
}

#[derive(Debug, Deserialize)]
struct JobAd {
    #[serde(default)]
    sections: JobAdSections,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobAdSections {
    #[serde(default)]
    company_description: Option<JobAdSection>,
    #[serde(default)]
    job_description: Option<JobAdSection>,
    #[serde(default)]
    qualifications: Option<JobAdSection>,
    #[serde(default)]
    additional_information: Option<JobAdSection>,
}

#[derive(Debug, Deserialize)]
struct JobAdSection {
    #[serde(default)]
    text: Option<String>,
}

fn location_string(location: Option<&SrLocation>) -> String {
    let Some(location) = location else {
        return String::new();
    };
    let mut parts: Vec<&str> = Vec::new();
    if let Some(city) = location.city.as_deref() {
        if !city.is_empty() {
            parts.push(city);
        }
    }
    if let Some(country) = location.country.as_deref() {
        if !country.is_empty() {
            parts.push(country);
        }
    }
    let mut joined = parts.join(", ");
    if location.remote {
        if joined.is_empty() {
            joined = "Remote".to_string();
        } else {
            joined.push_str(" / Remote");
        }
    }
    joined
}

/// Job-ad sections in display order, stripped and joined.
fn detail_text(detail: &PostingDetail) -> String {
    let Some(ad) = &detail.job_ad else {
        return String::new();
    };
    [
        ad.sections.company_description.as_ref(),
        ad.sections.job_description.as_ref(),
        ad.sections.qualifications.as_ref(),
        ad.sections.additional_information.as_ref(),
    ]
    .into_iter()
    .flatten()
    .filter_map(|section| section.text.as_deref())
    .map(strip_html)
    .filter(|text| !text.is_empty())
    .collect::<Vec<_>>()
    .join(" ")
}

pub struct SmartRecruitersAdapter;

#[async_trait]
impl SourceAdapter for SmartRecruitersAdapter {
    fn source(&self) -> DataSource {
        DataSource::SmartRecruiters
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
        let list_url = format!("{SMARTRECRUITERS_API_URL}/{}/postings", employer.slug);

        let response = match http.get(self.source(), &list_url, self.pace()).await {
            Ok(response) => response,
            Err(err) => return (Vec::new(), FetchStats::failed(describe_fetch_error(&err))),
        };

        let list: PostingList = match serde_json::from_slice(&response.body) {
            Ok(list) => list,
            Err(_) => return (Vec::new(), FetchStats::failed("Invalid response format")),
        };

        stats.jobs_fetched = list.content.len();
        let mut postings = Vec::new();

        for summary in list.content {
            let location = location_string(summary.location.as_ref());

            if !filters.is_relevant_role(&summary.name) {
                stats.filtered_by_title += 1;
                continue;
            }
            if !filters.matches_target_location(&location) {
                stats.filtered_by_location += 1;
                continue;
            }
            if summary.id.is_empty() {
                continue;
            }

            let detail_url = format!(
                "{SMARTRECRUITERS_API_URL}/{}/postings/{}",
                employer.slug, summary.id
            );
            let raw_text = match http.get(self.source(), &detail_url, self.pace()).await {
                Ok(detail_response) => {
                    match serde_json::from_slice::<PostingDetail>(&detail_response.body) {
                        Ok(detail) => detail_text(&detail),
                        Err(_) => String::new(),
                    }
                }
                Err(err) => {
                    // The listing row still identifies the posting; record
                    // the error once and carry on with an empty description.
                    if stats.error.is_none() {
                        stats.error = Some(describe_fetch_error(&err));
                    }
                    String::new()
                }
            };

            let remote = summary.location.as_ref().is_some_and(|l| l.remote);
            let country = summary
                .location
                .as_ref()
                .and_then(|l| l.country.clone());
            let structured = summary.location.as_ref().map(|l| StructuredLocation {
                city: l.city.clone(),
                region: l.region.clone(),
                country: l.country.clone(),
            });

            postings.push(
                RawPosting {
                    source: DataSource::SmartRecruiters,
                    posting_url: format!(
                        "https://jobs.smartrecruiters.com/{}/{}",
                        employer.slug, summary.id
                    ),
                    source_job_id: Some(summary.id),
                    title: summary.name,
                    company: employer.display_name.clone(),
                    location,
                    raw_text,
                    city_hint: None,
                    content_hash: String::new(),
                    hints: SourceHints {
                        company_slug: Some(employer.slug.clone()),
                        commitment: summary
                            .type_of_employment
                            .as_ref()
                            .and_then(SrIdent::value),
                        experience_level: summary
                            .experience_level
                            .as_ref()
                            .and_then(SrIdent::value),
                        location_type: remote.then(|| "remote".to_string()),
                        country_code: country,
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
    fn listing_parses_experience_level_and_location() {
        let list: PostingList = serde_json::from_str(
            r#"{
                "content": [{
                    "id": "744000001",
                    "name": "Lead Data Analyst",
                    "location": {"city": "London", "country": "gb", "remote": false},
                    "experienceLevel": {"id": "mid_senior_level", "label": "Mid-Senior Level"},
                    "typeOfEmployment": {"label": "Full-time"}
                }]
            }"#,
        )
        .expect("parse");
        let summary = &list.content[0];
        assert_eq!(summary.name, "Lead Data Analyst");
        assert_eq!(
            summary.experience_level.as_ref().and_then(SrIdent::value),
            Some("mid_senior_level".to_string())
        );
        assert_eq!(location_string(summary.location.as_ref()), "London, gb");
    }

    #[test]
    fn remote_listing_location_is_marked() {
        let location = SrLocation {
            city: Some("Berlin".into()),
            region: None,
            country: Some("de".into()),
            remote: true,
        };
        assert_eq!(location_string(Some(&location)), "Berlin, de / Remote");
    }

    #[test]
    fn detail_sections_are_joined_in_order() {
        let detail: PostingDetail = serde_json::from_str(
            r#"{
                "jobAd": {
                    "sections": {
                        "companyDescription": {"text": "<p>We build banks.</p>"},
                        "jobDescription": {"text": "<p>Model credit risk.</p>"},
                        "qualifications": {"text": "<ul><li>SQL</li></ul>"}
                    }
                }
            }"#,
        )
        .expect("parse");
        assert_eq!(
            detail_text(&detail),
            "We build banks. Model credit risk. SQL"
        );
    }

    #[test]
    fn missing_job_ad_yields_empty_text() {
        let detail: PostingDetail = serde_json::from_str("{}").expect("parse");
        assert_eq!(detail_text(&detail), "");
    }
}
