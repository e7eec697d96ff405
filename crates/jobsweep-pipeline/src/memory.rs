//! In-memory store used for `--skip-storage` debugging runs and tests.
//! Mirrors the Postgres upsert semantics exactly.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobsweep_core::{DataSource, EnrichedPosting, RawPosting};
use jobsweep_storage::{
    EnrichedJobStore, RawJobStore, RawUpsert, StoreError, UpsertAction,
};

#[derive(Debug, Clone)]
struct MemoryRaw {
    id: i64,
    content_hash: String,
    company_slug: Option<String>,
    source: DataSource,
    last_seen: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    next_id: AtomicI64,
    raw: Mutex<HashMap<(DataSource, String), MemoryRaw>>,
    enriched: Mutex<HashMap<i64, EnrichedPosting>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            raw: Mutex::new(HashMap::new()),
            enriched: Mutex::new(HashMap::new()),
        }
    }

    pub fn raw_count(&self) -> usize {
        self.raw.lock().expect("lock").len()
    }

    pub fn enriched_count(&self) -> usize {
        self.enriched.lock().expect("lock").len()
    }

    pub fn enriched_for(&self, raw_id: i64) -> Option<EnrichedPosting> {
        self.enriched.lock().expect("lock").get(&raw_id).cloned()
    }

    pub fn raw_id_for(&self, source: DataSource, posting_url: &str) -> Option<i64> {
        self.raw
            .lock()
            .expect("lock")
            .get(&(source, posting_url.to_string()))
            .map(|row| row.id)
    }

    /// Backdate one row's liveness, for resume-window tests.
    pub fn age_raw_row(&self, source: DataSource, posting_url: &str, hours: i64) {
        let mut raw = self.raw.lock().expect("lock");
        if let Some(row) = raw.get_mut(&(source, posting_url.to_string())) {
            row.last_seen = Utc::now() - chrono::Duration::hours(hours);
        }
    }
}

#[async_trait]
impl RawJobStore for MemoryStore {
    async fn upsert_raw(&self, posting: &RawPosting) -> Result<RawUpsert, StoreError> {
        let mut raw = self.raw.lock().expect("lock");
        let key = (posting.source, posting.posting_url.clone());

        if let Some(existing) = raw.get_mut(&key) {
            existing.last_seen = Utc::now();
            if existing.content_hash == posting.content_hash {
                return Ok(RawUpsert {
                    id: existing.id,
                    action: UpsertAction::UpdatedSame,
                    was_duplicate: true,
                });
            }
            existing.content_hash = posting.content_hash.clone();
            return Ok(RawUpsert {
                id: existing.id,
                action: UpsertAction::UpdatedChanged,
                was_duplicate: false,
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        raw.insert(
            key,
            MemoryRaw {
                id,
                content_hash: posting.content_hash.clone(),
                company_slug: posting.hints.company_slug.clone(),
                source: posting.source,
                last_seen: Utc::now(),
            },
        );
        Ok(RawUpsert {
            id,
            action: UpsertAction::Inserted,
            was_duplicate: false,
        })
    }

    async fn slugs_seen_since(
        &self,
        source: DataSource,
        window_hours: i64,
    ) -> Result<HashSet<String>, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::hours(window_hours);
        let raw = self.raw.lock().expect("lock");
        Ok(raw
            .values()
            .filter(|row| row.source == source && row.last_seen >= cutoff)
            .filter_map(|row| row.company_slug.clone())
            .collect())
    }
}

#[async_trait]
impl EnrichedJobStore for MemoryStore {
    async fn upsert_enriched(
        &self,
        raw_job_id: i64,
        row: &EnrichedPosting,
    ) -> Result<i64, StoreError> {
        let mut enriched = self.enriched.lock().expect("lock");
        enriched.insert(raw_job_id, row.clone());
        Ok(raw_job_id)
    }
}
