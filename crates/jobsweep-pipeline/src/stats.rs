//! Sweep accounting: per-company blocks and the aggregate summary, owned by
//! the orchestrator and serialized at the end of the run.

use std::time::{Duration, Instant};

use jobsweep_adapters::FetchStats;
use serde::Serialize;
use tracing::info;

const RECENT_ERROR_CAP: usize = 20;

/// Counters for one employer's processing pass.
#[derive(Debug, Clone, Default)]
pub struct CompanyStats {
    pub slug: String,
    pub fetch: FetchStats,
    pub jobs_written_raw: usize,
    pub jobs_duplicate: usize,
    pub jobs_classified: usize,
    pub jobs_agency_filtered: usize,
    pub jobs_skipped_thin: usize,
    pub classify_errors: usize,
    pub upsert_errors: usize,
    pub jobs_written_enriched: usize,
    pub cost_classification: f64,
    pub elapsed: Duration,
    /// Per-posting failure messages, folded into the sweep's capped list.
    pub errors: Vec<String>,
}

impl CompanyStats {
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            ..Self::default()
        }
    }

    pub fn log_block(&self) {
        info!(
            slug = %self.slug,
            scraped = self.fetch.jobs_fetched,
            filtered_title = self.fetch.filtered_by_title,
            filtered_location = self.fetch.filtered_by_location,
            kept = self.fetch.jobs_kept,
            written_raw = self.jobs_written_raw,
            duplicates = self.jobs_duplicate,
            classified = self.jobs_classified,
            agency_filtered = self.jobs_agency_filtered,
            skipped_thin = self.jobs_skipped_thin,
            enriched = self.jobs_written_enriched,
            errors = self.classify_errors + self.upsert_errors,
            cost_usd = format!("{:.4}", self.cost_classification),
            elapsed_secs = format!("{:.1}", self.elapsed.as_secs_f64()),
            "company complete"
        );
    }
}

/// Aggregate accounting for one sweep. One accumulator per top-level
/// invocation; parallel city sweeps own separate instances.
#[derive(Debug)]
pub struct SweepStats {
    pub companies_total: usize,
    pub companies_processed: usize,
    pub companies_skipped: usize,
    pub companies_with_jobs: usize,
    pub jobs_scraped: usize,
    pub jobs_kept: usize,
    pub jobs_filtered_title: usize,
    pub jobs_filtered_location: usize,
    pub jobs_written_raw: usize,
    pub jobs_duplicate: usize,
    pub jobs_classified: usize,
    pub jobs_agency_filtered: usize,
    pub jobs_skipped_thin: usize,
    pub classify_errors: usize,
    pub upsert_errors: usize,
    pub jobs_written_enriched: usize,
    pub cost_classification: f64,
    pub cost_saved_filtering: f64,
    pub recent_errors: Vec<String>,
    classifier_unit_cost: f64,
    started: Instant,
    company_durations: Vec<Duration>,
}

impl SweepStats {
    pub fn new(classifier_unit_cost: f64) -> Self {
        Self {
            companies_total: 0,
            companies_processed: 0,
            companies_skipped: 0,
            companies_with_jobs: 0,
            jobs_scraped: 0,
            jobs_kept: 0,
            jobs_filtered_title: 0,
            jobs_filtered_location: 0,
            jobs_written_raw: 0,
            jobs_duplicate: 0,
            jobs_classified: 0,
            jobs_agency_filtered: 0,
            jobs_skipped_thin: 0,
            classify_errors: 0,
            upsert_errors: 0,
            jobs_written_enriched: 0,
            cost_classification: 0.0,
            cost_saved_filtering: 0.0,
            recent_errors: Vec::new(),
            classifier_unit_cost,
            started: Instant::now(),
            company_durations: Vec::new(),
        }
    }

    /// Fold one company's counters into the sweep totals. Every posting that
    /// never reached the classifier counts toward the saved-cost estimate.
    pub fn absorb_company(&mut self, company: &CompanyStats) {
        self.companies_processed += 1;
        if company.fetch.jobs_kept > 0 {
            self.companies_with_jobs += 1;
        }
        self.jobs_scraped += company.fetch.jobs_fetched;
        self.jobs_kept += company.fetch.jobs_kept;
        self.jobs_filtered_title += company.fetch.filtered_by_title;
        self.jobs_filtered_location += company.fetch.filtered_by_location;
        self.jobs_written_raw += company.jobs_written_raw;
        self.jobs_duplicate += company.jobs_duplicate;
        self.jobs_classified += company.jobs_classified;
        self.jobs_agency_filtered += company.jobs_agency_filtered;
        self.jobs_skipped_thin += company.jobs_skipped_thin;
        self.classify_errors += company.classify_errors;
        self.upsert_errors += company.upsert_errors;
        self.jobs_written_enriched += company.jobs_written_enriched;
        self.cost_classification += company.cost_classification;

        let skipped_before_classification = company.fetch.filtered_by_title
            + company.fetch.filtered_by_location
            + company.jobs_duplicate
            + company.jobs_agency_filtered;
        self.cost_saved_filtering +=
            skipped_before_classification as f64 * self.classifier_unit_cost;

        if let Some(error) = &company.fetch.error {
            self.record_error(format!("{}: {}", company.slug, error));
        }
        for error in &company.errors {
            self.record_error(format!("{}: {}", company.slug, error));
        }
        self.company_durations.push(company.elapsed);
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        if self.recent_errors.len() < RECENT_ERROR_CAP {
            self.recent_errors.push(message.into());
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// ETA from the rolling per-company mean.
    pub fn eta(&self) -> Option<Duration> {
        if self.company_durations.is_empty() {
            return None;
        }
        let total: Duration = self.company_durations.iter().sum();
        let mean = total / self.company_durations.len() as u32;
        let remaining = self
            .companies_total
            .saturating_sub(self.companies_processed + self.companies_skipped);
        Some(mean * remaining as u32)
    }

    pub fn summary(&self) -> SweepSummary {
        SweepSummary {
            companies_total: self.companies_total,
            companies_processed: self.companies_processed,
            companies_skipped: self.companies_skipped,
            companies_with_jobs: self.companies_with_jobs,
            jobs_scraped: self.jobs_scraped,
            jobs_kept: self.jobs_kept,
            jobs_written_raw: self.jobs_written_raw,
            jobs_duplicate: self.jobs_duplicate,
            jobs_classified: self.jobs_classified,
            jobs_agency_filtered: self.jobs_agency_filtered,
            jobs_skipped_thin: self.jobs_skipped_thin,
            classify_errors: self.classify_errors,
            upsert_errors: self.upsert_errors,
            jobs_written_enriched: self.jobs_written_enriched,
            cost_classification: self.cost_classification,
            cost_saved_filtering: self.cost_saved_filtering,
            elapsed_secs: self.elapsed().as_secs_f64(),
            recent_errors: self.recent_errors.clone(),
        }
    }

    pub fn log_final_block(&self, label: &str) {
        info!(
            label,
            companies_total = self.companies_total,
            companies_processed = self.companies_processed,
            companies_skipped = self.companies_skipped,
            jobs_scraped = self.jobs_scraped,
            jobs_kept = self.jobs_kept,
            written_raw = self.jobs_written_raw,
            duplicates = self.jobs_duplicate,
            classified = self.jobs_classified,
            agency_filtered = self.jobs_agency_filtered,
            enriched = self.jobs_written_enriched,
            errors = self.classify_errors + self.upsert_errors,
            cost_usd = format!("{:.2}", self.cost_classification),
            cost_saved_usd = format!("{:.2}", self.cost_saved_filtering),
            elapsed_min = format!("{:.1}", self.elapsed().as_secs_f64() / 60.0),
            "sweep complete"
        );
    }
}

/// Serializable snapshot of the sweep counters for the final report blob.
#[derive(Debug, Clone, Serialize)]
pub struct SweepSummary {
    pub companies_total: usize,
    pub companies_processed: usize,
    pub companies_skipped: usize,
    pub companies_with_jobs: usize,
    pub jobs_scraped: usize,
    pub jobs_kept: usize,
    pub jobs_written_raw: usize,
    pub jobs_duplicate: usize,
    pub jobs_classified: usize,
    pub jobs_agency_filtered: usize,
    pub jobs_skipped_thin: usize,
    pub classify_errors: usize,
    pub upsert_errors: usize,
    pub jobs_written_enriched: usize,
    pub cost_classification: f64,
    pub cost_saved_filtering: f64,
    pub elapsed_secs: f64,
    pub recent_errors: Vec<String>,
}
