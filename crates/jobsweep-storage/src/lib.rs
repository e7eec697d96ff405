//! Shared HTTP fetch behavior and the relational raw/enriched stores.

pub mod http;
pub mod store;

pub use http::{FetchError, FetchedResponse, HttpClientConfig, HttpFetcher, RetryPolicy};
pub use store::{
    EnrichedJobStore, PgJobStore, RawJobStore, RawUpsert, StoreError, UpsertAction,
};

pub const CRATE_NAME: &str = "jobsweep-storage";
