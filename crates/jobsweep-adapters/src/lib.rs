//! Source adapters: one module per ATS plus the Adzuna aggregator client.
//!
//! Every adapter normalizes its wire format into `RawPosting`, applies the
//! cheap title/location pre-filters, and reports per-board `FetchStats`. A
//! failing board never aborts a sweep; errors land in the stats instead.

use std::time::Duration;

use async_trait::async_trait;
use jobsweep_core::{DataSource, EmployerRef, RawPosting};
use jobsweep_storage::{FetchError, HttpFetcher};
use serde::Serialize;

pub mod adzuna;
pub mod ashby;
pub mod filters;
pub mod google;
pub mod greenhouse;
pub mod lever;
pub mod smartrecruiters;
pub mod workable;

pub use adzuna::{AdzunaClient, CityTarget};
pub use filters::{strip_html, FilterSet};

pub const CRATE_NAME: &str = "jobsweep-adapters";

/// Per-board fetch outcome. One failing employer is recorded here and the
/// sweep moves on.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchStats {
    pub jobs_fetched: usize,
    pub jobs_kept: usize,
    pub filtered_by_title: usize,
    pub filtered_by_location: usize,
    pub error: Option<String>,
}

impl FetchStats {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> DataSource;

    /// Minimum gap between requests to this source. The shared fetcher's
    /// per-source pacing gate enforces it across concurrent tasks.
    fn pace(&self) -> Duration;

    /// Fetch one employer's board, normalize, and pre-filter. Pure with
    /// respect to the stores.
    async fn fetch_board(
        &self,
        http: &HttpFetcher,
        employer: &EmployerRef,
        filters: &FilterSet,
    ) -> (Vec<RawPosting>, FetchStats);
}

/// Registry for the direct-ATS sources. The Adzuna aggregator is driven by
/// search queries rather than employer slugs and has its own client type.
pub fn adapter_for_source(source: DataSource) -> Option<Box<dyn SourceAdapter>> {
    match source {
        DataSource::Greenhouse => Some(Box::new(greenhouse::GreenhouseAdapter)),
        DataSource::Lever => Some(Box::new(lever::LeverAdapter)),
        DataSource::Ashby => Some(Box::new(ashby::AshbyAdapter)),
        DataSource::Workable => Some(Box::new(workable::WorkableAdapter)),
        DataSource::SmartRecruiters => Some(Box::new(smartrecruiters::SmartRecruitersAdapter)),
        DataSource::Google => Some(Box::new(google::GoogleFeedAdapter)),
        DataSource::Adzuna => None,
    }
}

/// Map a transport failure to the stable stats wording.
pub(crate) fn describe_fetch_error(err: &FetchError) -> String {
    if err.is_not_found() {
        "Company not found".to_string()
    } else if err.is_rate_limited() {
        "Rate limited".to_string()
    } else if err.is_timeout() {
        "Timeout".to_string()
    } else {
        let mut text = err.to_string();
        text.truncate(100);
        text
    }
}
