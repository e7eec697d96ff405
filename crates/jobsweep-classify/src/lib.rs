//! Classifier gateway: wraps the LLM RPC behind a length gate, a closed
//! output schema, defensive parsing, and token/cost accounting. The gateway
//! never touches the database; retry is bounded and only for transient
//! transport failures.

use thiserror::Error;

pub mod client;
pub mod gateway;
pub mod parse;
pub mod prompt;

pub use client::{
    ClassifierClient, ClientError, CompletionRequest, CompletionResponse, MessagesApiClient,
    MessagesApiSettings,
};
pub use gateway::{ClassifierGateway, GatewaySettings, MIN_CHARS_BARE, MIN_CHARS_WITH_CONTEXT};
pub use prompt::StructuredInput;

pub const CRATE_NAME: &str = "jobsweep-classify";

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("description below the {minimum}-char classification gate ({actual} chars)")]
    ContentTooShort { minimum: usize, actual: usize },
    #[error("classifier rate limited")]
    RateLimited,
    #[error("classifier returned invalid JSON: {0}")]
    InvalidJson(String),
    #[error("classifier output violates the schema: {0}")]
    SchemaViolation(String),
    #[error("classifier transport error: {0}")]
    TransportError(String),
}
