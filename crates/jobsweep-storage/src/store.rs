//! Postgres persistence for raw and enriched postings.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use jobsweep_core::{DataSource, EnrichedPosting, RawPosting};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    Inserted,
    UpdatedChanged,
    UpdatedSame,
}

/// Result of one raw upsert. `was_duplicate` is the single pivot that lets
/// the orchestrator skip classification for unchanged postings.
#[derive(Debug, Clone, Copy)]
pub struct RawUpsert {
    pub id: i64,
    pub action: UpsertAction,
    pub was_duplicate: bool,
}

#[async_trait]
pub trait RawJobStore: Send + Sync {
    async fn upsert_raw(&self, posting: &RawPosting) -> Result<RawUpsert, StoreError>;

    /// Slugs with raw liveness inside the window, for the bulk resume skip.
    async fn slugs_seen_since(
        &self,
        source: DataSource,
        window_hours: i64,
    ) -> Result<HashSet<String>, StoreError>;
}

#[async_trait]
pub trait EnrichedJobStore: Send + Sync {
    async fn upsert_enriched(
        &self,
        raw_job_id: i64,
        row: &EnrichedPosting,
    ) -> Result<i64, StoreError>;
}

/// Column defaults applied when the classifier left a field empty.
pub(crate) fn write_defaults(
    row: &EnrichedPosting,
    today: NaiveDate,
) -> (String, String, String, NaiveDate, NaiveDate) {
    let family = row
        .job_family
        .clone()
        .unwrap_or_else(|| "out_of_scope".to_string());
    let arrangement = row
        .working_arrangement
        .map(|w| w.as_str().to_string())
        .unwrap_or_else(|| "onsite".to_string());
    let position_type = row
        .position_type
        .clone()
        .unwrap_or_else(|| "full_time".to_string());
    let posted = row.posted_date.unwrap_or(today);
    let last_seen = row.last_seen_date.unwrap_or(today);
    (family, arrangement, position_type, posted, last_seen)
}

#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl RawJobStore for PgJobStore {
    async fn upsert_raw(&self, posting: &RawPosting) -> Result<RawUpsert, StoreError> {
        let existing = sqlx::query(
            "SELECT id, content_hash FROM raw_jobs WHERE source = $1 AND posting_url = $2",
        )
        .bind(posting.source.as_str())
        .bind(&posting.posting_url)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = existing {
            let id: i64 = row.get("id");
            let stored_hash: String = row.get("content_hash");

            if stored_hash == posting.content_hash {
                sqlx::query("UPDATE raw_jobs SET last_seen = now() WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool)
                    .await?;
                return Ok(RawUpsert {
                    id,
                    action: UpsertAction::UpdatedSame,
                    was_duplicate: true,
                });
            }

            sqlx::query(
                "UPDATE raw_jobs
                 SET title = $2, raw_text = $3, content_hash = $4, metadata = $5,
                     last_seen = now()
                 WHERE id = $1",
            )
            .bind(id)
            .bind(&posting.title)
            .bind(&posting.raw_text)
            .bind(&posting.content_hash)
            .bind(Json(&posting.hints))
            .execute(&self.pool)
            .await?;
            return Ok(RawUpsert {
                id,
                action: UpsertAction::UpdatedChanged,
                was_duplicate: false,
            });
        }

        // A concurrent writer can land between the select and this insert;
        // the unique index resolves the race and the losing insert degrades
        // to a liveness touch.
        let row = sqlx::query(
            "INSERT INTO raw_jobs
                 (source, posting_url, title, company, raw_text, content_hash,
                  city_code, source_job_id, metadata, first_seen, last_seen)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now(), now())
             ON CONFLICT (source, posting_url) DO UPDATE SET last_seen = now()
             RETURNING id, (xmax = 0) AS inserted",
        )
        .bind(posting.source.as_str())
        .bind(&posting.posting_url)
        .bind(&posting.title)
        .bind(&posting.company)
        .bind(&posting.raw_text)
        .bind(&posting.content_hash)
        .bind(&posting.city_hint)
        .bind(&posting.source_job_id)
        .bind(Json(&posting.hints))
        .fetch_one(&self.pool)
        .await?;

        let id: i64 = row.get("id");
        let inserted: bool = row.get("inserted");
        if inserted {
            Ok(RawUpsert {
                id,
                action: UpsertAction::Inserted,
                was_duplicate: false,
            })
        } else {
            Ok(RawUpsert {
                id,
                action: UpsertAction::UpdatedSame,
                was_duplicate: true,
            })
        }
    }

    async fn slugs_seen_since(
        &self,
        source: DataSource,
        window_hours: i64,
    ) -> Result<HashSet<String>, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::hours(window_hours);
        let rows = sqlx::query(
            "SELECT DISTINCT metadata->>'company_slug' AS slug
             FROM raw_jobs
             WHERE source = $1 AND last_seen >= $2
               AND metadata->>'company_slug' IS NOT NULL",
        )
        .bind(source.as_str())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| row.get::<String, _>("slug"))
            .collect())
    }
}

#[async_trait]
impl EnrichedJobStore for PgJobStore {
    async fn upsert_enriched(
        &self,
        raw_job_id: i64,
        row: &EnrichedPosting,
    ) -> Result<i64, StoreError> {
        let today = Utc::now().date_naive();
        let (family, arrangement, position_type, posted_date, last_seen_date) =
            write_defaults(row, today);

        let result = sqlx::query(
            "INSERT INTO enriched_jobs
                 (raw_job_id, employer_name, title_display, job_family, job_subfamily,
                  seniority, track, position_type, working_arrangement, locations,
                  experience_range, employer_department, employer_size, is_agency,
                  agency_confidence, currency, salary_min, salary_max, equity_eligible,
                  skills, data_source, description_source, deduplicated, posted_date,
                  last_seen_date, classified_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                     $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, now())
             ON CONFLICT (raw_job_id) DO UPDATE SET
                 employer_name = EXCLUDED.employer_name,
                 title_display = EXCLUDED.title_display,
                 job_family = EXCLUDED.job_family,
                 job_subfamily = EXCLUDED.job_subfamily,
                 seniority = EXCLUDED.seniority,
                 track = EXCLUDED.track,
                 position_type = EXCLUDED.position_type,
                 working_arrangement = EXCLUDED.working_arrangement,
                 locations = EXCLUDED.locations,
                 experience_range = EXCLUDED.experience_range,
                 employer_department = EXCLUDED.employer_department,
                 employer_size = EXCLUDED.employer_size,
                 is_agency = EXCLUDED.is_agency,
                 agency_confidence = EXCLUDED.agency_confidence,
                 currency = EXCLUDED.currency,
                 salary_min = EXCLUDED.salary_min,
                 salary_max = EXCLUDED.salary_max,
                 equity_eligible = EXCLUDED.equity_eligible,
                 skills = EXCLUDED.skills,
                 data_source = EXCLUDED.data_source,
                 description_source = EXCLUDED.description_source,
                 deduplicated = EXCLUDED.deduplicated,
                 last_seen_date = EXCLUDED.last_seen_date,
                 classified_at = now()
             RETURNING id",
        )
        .bind(raw_job_id)
        .bind(&row.employer_name)
        .bind(&row.title_display)
        .bind(family)
        .bind(&row.job_subfamily)
        .bind(&row.seniority)
        .bind(&row.track)
        .bind(position_type)
        .bind(arrangement)
        .bind(Json(&row.locations))
        .bind(&row.experience_range)
        .bind(&row.employer_department)
        .bind(&row.employer_size)
        .bind(row.is_agency)
        .bind(row.agency_confidence.as_str())
        .bind(&row.currency)
        .bind(row.salary_min)
        .bind(row.salary_max)
        .bind(row.equity_eligible)
        .bind(Json(&row.skills))
        .bind(row.data_source.as_str())
        .bind(row.description_source.as_str())
        .bind(row.deduplicated)
        .bind(posted_date)
        .bind(last_seen_date)
        .fetch_one(&self.pool)
        .await?;

        Ok(result.get::<i64, _>("id"))
    }
}
