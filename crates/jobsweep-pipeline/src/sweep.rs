//! Sweep runner: wires stores, gateway, detectors, and adapters together
//! for one city invocation, then runs the per-source orchestrators and the
//! cross-source merge.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use jobsweep_adapters::{adapter_for_source, AdzunaClient, CityTarget};
use jobsweep_classify::{
    ClassifierGateway, GatewaySettings, MessagesApiClient, MessagesApiSettings,
};
use jobsweep_core::{DataSource, RawPosting};
use jobsweep_storage::{
    EnrichedJobStore, HttpClientConfig, HttpFetcher, PgJobStore, RawJobStore, RetryPolicy,
};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agency::AgencyDetector;
use crate::config::{ConfigBundle, PipelineConfig};
use crate::dedup::{merge_batches, MergeStats};
use crate::memory::MemoryStore;
use crate::orchestrator::{Provenance, SourceOrchestrator};
use crate::stats::{SweepStats, SweepSummary};
use crate::taxonomy::TaxonomyMapper;

#[derive(Debug, Clone)]
pub struct SweepOptions {
    pub city: String,
    pub max_jobs: usize,
    pub sources: Vec<DataSource>,
    /// Restrict ATS sources to these slugs.
    pub companies: Option<Vec<String>>,
    pub min_description_length: usize,
    pub skip_classification: bool,
    pub skip_storage: bool,
    pub resume_hours: i64,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            city: "lon".to_string(),
            max_jobs: 100,
            sources: vec![DataSource::Adzuna, DataSource::Greenhouse],
            companies: None,
            min_description_length: 0,
            skip_classification: false,
            skip_storage: false,
            resume_hours: 0,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SweepReport {
    pub run_id: Uuid,
    pub city: String,
    pub summary: SweepSummary,
    pub merge: Option<MergeStats>,
}

/// Aggregator search targets per city code.
pub fn city_target(code: &str) -> Option<CityTarget> {
    let (country, display) = match code.to_ascii_lowercase().as_str() {
        "lon" => ("gb", "London"),
        "nyc" => ("us", "New York"),
        "den" => ("us", "Denver"),
        _ => return None,
    };
    Some(CityTarget {
        code: code.to_ascii_lowercase(),
        country: country.to_string(),
        display: display.to_string(),
    })
}

/// One full sweep over the configured sources. Startup misconfiguration is
/// the only fatal path; everything downstream lands in the stats.
pub async fn run_sweep(
    config: &PipelineConfig,
    bundle: &ConfigBundle,
    options: SweepOptions,
) -> Result<SweepReport> {
    let run_id = Uuid::new_v4();
    info!(
        %run_id,
        city = %options.city,
        sources = ?options.sources.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
        resume_hours = options.resume_hours,
        "sweep starting"
    );

    let http = HttpFetcher::new(HttpClientConfig {
        timeout: Duration::from_secs(config.http_timeout_secs),
        user_agent: Some(config.user_agent.clone()),
        max_in_flight: config.http_max_in_flight,
        retry: RetryPolicy {
            max_attempts: config.http_retry_attempts,
            initial_backoff: Duration::from_millis(config.http_retry_backoff_ms),
            ..RetryPolicy::default()
        },
    })?;

    let (raw_store, enriched_store): (Arc<dyn RawJobStore>, Arc<dyn EnrichedJobStore>) =
        if options.skip_storage {
            let store = Arc::new(MemoryStore::new());
            (store.clone(), store)
        } else {
            let store = Arc::new(
                PgJobStore::connect(&config.database_url, 8)
                    .await
                    .context("connecting to database")?,
            );
            (store.clone(), store)
        };

    let gateway = if options.skip_classification {
        None
    } else {
        let settings = MessagesApiSettings::from_env().map_err(|err| anyhow!(err))?;
        let client = Arc::new(
            MessagesApiClient::new(settings).context("building classifier client")?,
        );
        Some(Arc::new(ClassifierGateway::new(
            client,
            GatewaySettings::from_env(),
            bundle.taxonomy.subfamily_to_family.clone(),
        )))
    };

    let agency = Arc::new(AgencyDetector::new(bundle.agency.clone()));
    let mapper = Arc::new(TaxonomyMapper::new(
        bundle.taxonomy.clone(),
        bundle.suppression.clone(),
    ));

    let mut stats = SweepStats::new(config.classifier_unit_cost);
    let mut direct_batch: Vec<RawPosting> = Vec::new();

    for source in options
        .sources
        .iter()
        .copied()
        .filter(|s| !s.is_aggregator())
    {
        let Some(adapter) = adapter_for_source(source) else {
            warn!(source = %source, "no adapter registered, skipping");
            continue;
        };

        let mut employers = bundle.employers_for(source).to_vec();
        if let Some(companies) = &options.companies {
            employers.retain(|employer| companies.contains(&employer.slug));
        }
        if employers.is_empty() {
            info!(source = %source, "no employers configured, skipping");
            continue;
        }

        let orchestrator = SourceOrchestrator::new(
            source,
            raw_store.clone(),
            enriched_store.clone(),
            gateway.clone(),
            agency.clone(),
            mapper.clone(),
            options.min_description_length,
        );
        let kept = orchestrator
            .run(
                adapter.as_ref(),
                &http,
                &employers,
                bundle.filters_for(source),
                options.resume_hours,
                &mut stats,
            )
            .await;
        direct_batch.extend(kept);
    }

    let mut merge_stats = None;
    if options.sources.contains(&DataSource::Adzuna) {
        let (Some(app_id), Some(app_key)) =
            (config.adzuna_app_id.clone(), config.adzuna_app_key.clone())
        else {
            bail!("ADZUNA_APP_ID and ADZUNA_APP_KEY must be set for the adzuna source");
        };
        let Some(city) = city_target(&options.city) else {
            bail!("unknown city code '{}'", options.city);
        };
        if bundle.adzuna_queries.is_empty() {
            bail!("adzuna/search_queries.yaml configured no queries");
        }

        let client = AdzunaClient::new(app_id, app_key, bundle.adzuna_queries.clone());
        info!(
            planned_requests = client.planned_requests(options.max_jobs),
            queries = client.queries().len(),
            "starting aggregator fetch"
        );

        let (batch, fetch_stats) = client
            .fetch_city(
                &http,
                &city,
                options.max_jobs,
                bundle.filters_for(DataSource::Adzuna),
            )
            .await;

        let orchestrator = SourceOrchestrator::new(
            DataSource::Adzuna,
            raw_store.clone(),
            enriched_store.clone(),
            gateway.clone(),
            agency.clone(),
            mapper.clone(),
            options.min_description_length,
        );

        let (entries, label, batch_fetch) = if direct_batch.is_empty() {
            let entries = batch
                .into_iter()
                .map(|posting| {
                    let provenance = Provenance::from_source(posting.source);
                    (posting, provenance)
                })
                .collect::<Vec<_>>();
            (entries, "adzuna", fetch_stats)
        } else {
            let (merged, mstats) = merge_batches(std::mem::take(&mut direct_batch), batch);
            info!(
                deduplicated = mstats.deduplicated,
                aggregator_only = mstats.aggregator_only,
                dedup_rate = format!("{:.1}%", mstats.dedup_rate),
                "cross-source merge complete"
            );
            // Direct-only rows were already processed; only aggregator rows
            // and collided winners need a pass.
            let entries = merged
                .into_iter()
                .filter(|entry| entry.deduplicated || entry.posting.source.is_aggregator())
                .map(|entry| {
                    let provenance = Provenance {
                        description_source: entry.description_source,
                        deduplicated: entry.deduplicated,
                    };
                    (entry.posting, provenance)
                })
                .collect::<Vec<_>>();
            merge_stats = Some(mstats);
            (entries, "adzuna+merge", fetch_stats)
        };

        stats.companies_total += 1;
        orchestrator
            .process_batch(entries, label, batch_fetch, &mut stats)
            .await;
    }

    stats.log_final_block(&options.city);
    Ok(SweepReport {
        run_id,
        city: options.city,
        summary: stats.summary(),
        merge: merge_stats,
    })
}
