use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use jobsweep_core::DataSource;
use jobsweep_pipeline::{run_sweep, ConfigBundle, PipelineConfig, SweepOptions};
use jobsweep_storage::PgJobStore;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "jobsweep")]
#[command(about = "Multi-source job ingestion and enrichment pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one sweep for a city.
    Sweep(SweepArgs),
    /// Run independent sweeps for several cities in parallel, each with its
    /// own cost counters.
    AllCities(AllCitiesArgs),
    /// Apply database migrations.
    Migrate,
}

#[derive(Debug, Clone, Args)]
struct SweepArgs {
    /// City code: lon, nyc, den.
    #[arg(default_value = "lon")]
    city: String,
    /// Max jobs per aggregator search query.
    #[arg(default_value_t = 100)]
    max_jobs: usize,
    /// Comma-separated sources:
    /// adzuna,greenhouse,lever,ashby,workable,smartrecruiters,google.
    #[arg(long, default_value = "adzuna,greenhouse")]
    sources: String,
    /// Restrict ATS sources to these comma-separated slugs.
    #[arg(long)]
    companies: Option<String>,
    /// Drop postings with descriptions shorter than this many characters.
    #[arg(long, default_value_t = 0)]
    min_description_length: usize,
    /// Fetch and store raw postings only.
    #[arg(long)]
    skip_classification: bool,
    /// Run against an in-memory store instead of the database.
    #[arg(long)]
    skip_storage: bool,
    /// Skip companies processed within the last N hours (0 = disabled).
    #[arg(long, default_value_t = 0)]
    resume_hours: i64,
}

#[derive(Debug, Args)]
struct AllCitiesArgs {
    /// Max jobs per aggregator search query.
    #[arg(default_value_t = 100)]
    max_jobs: usize,
    /// Comma-separated city codes to sweep in parallel.
    #[arg(long, default_value = "lon,nyc,den")]
    cities: String,
    #[arg(long, default_value = "adzuna,greenhouse")]
    sources: String,
    #[arg(long, default_value_t = 0)]
    resume_hours: i64,
}

fn parse_sources(value: &str) -> Result<Vec<DataSource>> {
    let mut sources = Vec::new();
    for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let Some(source) = DataSource::parse(name) else {
            bail!("unknown source '{name}'");
        };
        if !sources.contains(&source) {
            sources.push(source);
        }
    }
    if sources.is_empty() {
        bail!("no sources selected");
    }
    Ok(sources)
}

fn sweep_options(args: &SweepArgs) -> Result<SweepOptions> {
    Ok(SweepOptions {
        city: args.city.clone(),
        max_jobs: args.max_jobs,
        sources: parse_sources(&args.sources)?,
        companies: args.companies.as_ref().map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        }),
        min_description_length: args.min_description_length,
        skip_classification: args.skip_classification,
        skip_storage: args.skip_storage,
        resume_hours: args.resume_hours,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = PipelineConfig::from_env();

    match cli.command {
        Command::Sweep(args) => {
            let options = sweep_options(&args)?;
            let bundle = ConfigBundle::load(&config.config_dir)
                .context("loading configuration tables")?;
            let report = run_sweep(&config, &bundle, options).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("serializing sweep report")?
            );
        }
        Command::AllCities(args) => {
            let sources = parse_sources(&args.sources)?;
            let cities: Vec<String> = args
                .cities
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
            if cities.is_empty() {
                bail!("no cities selected");
            }

            // One task per city; sweeps are independent, counters included.
            let mut handles = Vec::new();
            for city in cities {
                let config = config.clone();
                let sources = sources.clone();
                let max_jobs = args.max_jobs;
                let resume_hours = args.resume_hours;
                handles.push(tokio::spawn(async move {
                    let bundle = ConfigBundle::load(&config.config_dir)
                        .context("loading configuration tables")?;
                    let options = SweepOptions {
                        city: city.clone(),
                        max_jobs,
                        sources,
                        resume_hours,
                        ..SweepOptions::default()
                    };
                    run_sweep(&config, &bundle, options).await
                }));
            }

            let mut failures = 0usize;
            for handle in handles {
                match handle.await {
                    Ok(Ok(report)) => {
                        info!(city = %report.city, enriched = report.summary.jobs_written_enriched, "city sweep finished");
                        println!(
                            "{}",
                            serde_json::to_string_pretty(&report)
                                .context("serializing sweep report")?
                        );
                    }
                    Ok(Err(err)) => {
                        error!(%err, "city sweep failed at startup");
                        failures += 1;
                    }
                    Err(err) => {
                        error!(%err, "city sweep task panicked");
                        failures += 1;
                    }
                }
            }
            if failures > 0 {
                bail!("{failures} city sweep(s) failed to start");
            }
        }
        Command::Migrate => {
            let store = PgJobStore::connect(&config.database_url, 2)
                .await
                .context("connecting to database")?;
            store.run_migrations().await.context("running migrations")?;
            info!("migrations applied");
        }
    }

    Ok(())
}
