//! Per-source orchestrator: drives the per-posting chain
//! upsert-raw → hard-filter → classify → map → soft-validate → upsert-enriched,
//! owns the resume skip and the sweep counters.
//!
//! Every posting failure is terminal for that posting only; a failing board
//! is terminal for that employer only. Nothing here aborts the sweep.

use std::sync::Arc;
use std::time::Instant;

use jobsweep_adapters::{FilterSet, SourceAdapter};
use jobsweep_classify::{ClassifierGateway, ClassifyError, StructuredInput};
use jobsweep_core::{
    AgencyVerdict, Classification, DataSource, EmployerRef, EnrichedPosting, RawPosting,
};
use jobsweep_storage::{EnrichedJobStore, HttpFetcher, RawJobStore};
use tracing::{debug, info, warn};

use crate::agency::AgencyDetector;
use crate::stats::{CompanyStats, SweepStats};
use crate::taxonomy::TaxonomyMapper;

/// Terminal state of one posting's pass through the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostingOutcome {
    Done,
    SkippedDup,
    FilteredAgency,
    SkippedThin,
    ClassifyError,
    UpsertError,
}

/// Provenance carried into the enriched write; the dedup merger overrides
/// the defaults for merged postings.
#[derive(Debug, Clone, Copy)]
pub struct Provenance {
    pub description_source: DataSource,
    pub deduplicated: bool,
}

impl Provenance {
    pub fn from_source(source: DataSource) -> Self {
        Self {
            description_source: source,
            deduplicated: false,
        }
    }
}

pub struct SourceOrchestrator {
    source: DataSource,
    raw_store: Arc<dyn RawJobStore>,
    enriched_store: Arc<dyn EnrichedJobStore>,
    /// `None` in `--skip-classification` runs: the chain stops after the
    /// raw upsert.
    gateway: Option<Arc<ClassifierGateway>>,
    agency: Arc<AgencyDetector>,
    mapper: Arc<TaxonomyMapper>,
    min_description_length: usize,
}

impl SourceOrchestrator {
    pub fn new(
        source: DataSource,
        raw_store: Arc<dyn RawJobStore>,
        enriched_store: Arc<dyn EnrichedJobStore>,
        gateway: Option<Arc<ClassifierGateway>>,
        agency: Arc<AgencyDetector>,
        mapper: Arc<TaxonomyMapper>,
        min_description_length: usize,
    ) -> Self {
        Self {
            source,
            raw_store,
            enriched_store,
            gateway,
            agency,
            mapper,
            min_description_length,
        }
    }

    pub fn source(&self) -> DataSource {
        self.source
    }

    fn structured_input(raw: &RawPosting) -> StructuredInput {
        StructuredInput {
            title: Some(raw.title.clone()),
            company: Some(raw.company.clone()),
            location: (!raw.location.is_empty()).then(|| raw.location.clone()),
            category: raw.hints.category.clone(),
            salary_min: raw.hints.salary_min,
            salary_max: raw.hints.salary_max,
            salary_predicted: raw.hints.salary_is_predicted,
            experience_level_hint: raw.hints.experience_level.clone(),
            workplace_type_hint: raw.hints.workplace_type.clone(),
            is_remote: raw.hints.is_remote,
        }
    }

    fn build_enriched(
        raw: &RawPosting,
        classification: Classification,
        provenance: Provenance,
    ) -> EnrichedPosting {
        let employer = classification.employer;
        let role = classification.role;
        let location = classification.location;
        let compensation = classification.compensation;

        EnrichedPosting {
            employer_name: raw.company.clone(),
            title_display: raw.title.clone(),
            job_family: role.job_family,
            job_subfamily: role.job_subfamily,
            seniority: role.seniority,
            track: role.track,
            position_type: role.position_type,
            working_arrangement: location.working_arrangement,
            locations: location.locations.unwrap_or_default(),
            experience_range: role.experience_range,
            employer_department: employer.department,
            employer_size: employer.company_size_estimate,
            is_agency: employer.is_agency.unwrap_or(false),
            agency_confidence: employer
                .agency_confidence
                .unwrap_or(jobsweep_core::AgencyConfidence::Low),
            currency: compensation.currency,
            salary_min: compensation.salary_min,
            salary_max: compensation.salary_max,
            equity_eligible: compensation.equity_eligible,
            skills: classification.skills,
            data_source: raw.source,
            description_source: provenance.description_source,
            deduplicated: provenance.deduplicated,
            posted_date: None,
            last_seen_date: None,
        }
    }

    /// One posting through the chain. Returns the terminal state and keeps
    /// the counters current.
    pub async fn process_posting(
        &self,
        raw: &RawPosting,
        provenance: Provenance,
        company: &mut CompanyStats,
    ) -> PostingOutcome {
        // UPSERT_RAW: durable first, so liveness survives later failures.
        let upsert = match self.raw_store.upsert_raw(raw).await {
            Ok(upsert) => upsert,
            Err(err) => {
                warn!(url = %raw.posting_url, %err, "raw upsert failed");
                company.errors.push(format!("raw upsert: {err}"));
                company.upsert_errors += 1;
                return PostingOutcome::UpsertError;
            }
        };

        if upsert.was_duplicate {
            company.jobs_duplicate += 1;
            debug!(title = %raw.title, "duplicate, classification skipped");
            return PostingOutcome::SkippedDup;
        }
        company.jobs_written_raw += 1;

        // AGENCY_HARD: a high-confidence name match never reaches the
        // classifier; the row is still published, flagged as agency.
        if self.agency.is_hard_agency(&raw.company) {
            company.jobs_agency_filtered += 1;
            let verdict = AgencyVerdict::agency(jobsweep_core::AgencyConfidence::High);
            let mut row = EnrichedPosting::unclassified(raw, verdict);
            row.description_source = provenance.description_source;
            row.deduplicated = provenance.deduplicated;
            return match self.enriched_store.upsert_enriched(upsert.id, &row).await {
                Ok(_) => PostingOutcome::FilteredAgency,
                Err(err) => {
                    company.errors.push(format!("enriched upsert: {err}"));
                    company.upsert_errors += 1;
                    PostingOutcome::UpsertError
                }
            };
        }

        let Some(gateway) = &self.gateway else {
            // --skip-classification: raw liveness only.
            return PostingOutcome::Done;
        };

        // DESCRIPTION_GATE + CLASSIFY.
        let structured = Self::structured_input(raw);
        let (mut classification, cost) = match gateway
            .classify(&raw.raw_text, &structured, raw.source.as_str())
            .await
        {
            Ok(result) => result,
            Err(ClassifyError::ContentTooShort { minimum, actual }) => {
                debug!(title = %raw.title, minimum, actual, "description below gate");
                company.jobs_skipped_thin += 1;
                return PostingOutcome::SkippedThin;
            }
            Err(err) => {
                warn!(title = %raw.title, %err, "classification failed");
                company.errors.push(format!("classify: {err}"));
                company.classify_errors += 1;
                return PostingOutcome::ClassifyError;
            }
        };
        company.jobs_classified += 1;
        company.cost_classification += cost.cost_usd;

        // MAP_TAXONOMY.
        self.mapper.apply(&mut classification, raw);

        // AGENCY_SOFT: label, never drop.
        let pattern = self.agency.detect(&raw.company, Some(&raw.raw_text));
        let classifier_verdict = classification.employer.is_agency.map(|is_agency| {
            AgencyVerdict {
                is_agency,
                confidence: classification
                    .employer
                    .agency_confidence
                    .unwrap_or(jobsweep_core::AgencyConfidence::Medium),
            }
        });
        let combined = self.agency.combine(pattern, classifier_verdict);
        if combined.is_agency {
            company.jobs_agency_filtered += 1;
        }
        classification.employer.is_agency = Some(combined.is_agency);
        classification.employer.agency_confidence = Some(combined.confidence);

        // UPSERT_ENRICHED.
        let row = Self::build_enriched(raw, classification, provenance);
        match self.enriched_store.upsert_enriched(upsert.id, &row).await {
            Ok(_) => {
                company.jobs_written_enriched += 1;
                PostingOutcome::Done
            }
            Err(err) => {
                company.errors.push(format!("enriched upsert: {err}"));
                company.upsert_errors += 1;
                PostingOutcome::UpsertError
            }
        }
    }

    /// One employer: fetch, pre-filter, run the chain over every posting.
    /// Returns the kept postings for the cross-source merge.
    pub async fn process_company(
        &self,
        adapter: &dyn SourceAdapter,
        http: &HttpFetcher,
        employer: &EmployerRef,
        filters: &FilterSet,
    ) -> (CompanyStats, Vec<RawPosting>) {
        let started = Instant::now();
        info!(source = %self.source, slug = %employer.slug, "processing company");

        let (mut postings, fetch_stats) = adapter.fetch_board(http, employer, filters).await;
        let mut company = CompanyStats::new(&employer.slug);
        company.fetch = fetch_stats;

        if self.min_description_length > 0 {
            let before = postings.len();
            postings.retain(|p| p.raw_text.len() >= self.min_description_length);
            company.jobs_skipped_thin += before - postings.len();
        }

        for (index, posting) in postings.iter().enumerate() {
            let outcome = self
                .process_posting(posting, Provenance::from_source(posting.source), &mut company)
                .await;
            debug!(
                index = index + 1,
                total = postings.len(),
                title = %posting.title,
                ?outcome,
                "posting processed"
            );
        }

        company.elapsed = started.elapsed();
        company.log_block();
        (company, postings)
    }

    /// Whole-source pass over the configured employer list with the bulk
    /// resume skip. Returns every kept posting for the merge stage.
    pub async fn run(
        &self,
        adapter: &dyn SourceAdapter,
        http: &HttpFetcher,
        employers: &[EmployerRef],
        filters: &FilterSet,
        resume_hours: i64,
        stats: &mut SweepStats,
    ) -> Vec<RawPosting> {
        let mut pending: Vec<EmployerRef> = employers.to_vec();
        stats.companies_total += pending.len();

        if resume_hours > 0 {
            match self.raw_store.slugs_seen_since(self.source, resume_hours).await {
                Ok(recent) => {
                    let before = pending.len();
                    pending.retain(|employer| !recent.contains(&employer.slug));
                    let skipped = before - pending.len();
                    stats.companies_skipped += skipped;
                    info!(
                        source = %self.source,
                        window_hours = resume_hours,
                        skipped,
                        remaining = pending.len(),
                        "resume window applied"
                    );
                }
                Err(err) => {
                    warn!(source = %self.source, %err, "resume query failed, processing all");
                }
            }
        }

        let mut collected = Vec::new();
        for employer in &pending {
            let (company, postings) = self
                .process_company(adapter, http, employer, filters)
                .await;
            stats.absorb_company(&company);
            collected.extend(postings);

            if let Some(eta) = stats.eta() {
                info!(
                    source = %self.source,
                    processed = stats.companies_processed,
                    total = stats.companies_total,
                    eta_min = format!("{:.1}", eta.as_secs_f64() / 60.0),
                    "sweep progress"
                );
            }
        }
        collected
    }

    /// Chain over a pre-fetched batch (the aggregator path and merged
    /// postings), accounted under one label. `fetch` carries the upstream
    /// fetch counters; merged batches pass a synthetic one.
    pub async fn process_batch(
        &self,
        entries: Vec<(RawPosting, Provenance)>,
        label: &str,
        fetch: jobsweep_adapters::FetchStats,
        stats: &mut SweepStats,
    ) {
        let started = Instant::now();
        let mut company = CompanyStats::new(label);
        company.fetch = fetch;
        if company.fetch.jobs_kept == 0 {
            company.fetch.jobs_kept = entries.len();
        }

        for (posting, provenance) in &entries {
            if self.min_description_length > 0
                && posting.raw_text.len() < self.min_description_length
            {
                company.jobs_skipped_thin += 1;
                continue;
            }
            self.process_posting(posting, *provenance, &mut company).await;
        }

        company.elapsed = started.elapsed();
        company.log_block();
        stats.absorb_company(&company);
    }
}
