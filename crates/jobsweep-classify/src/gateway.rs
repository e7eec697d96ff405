//! The classifier gateway: length gate, model selection, bounded transport
//! retry, defensive parse, deterministic family overwrite, cost accounting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jobsweep_core::{Classification, CostMeta};
use tracing::warn;

use crate::client::{ClassifierClient, ClientError, CompletionRequest};
use crate::parse::parse_classifier_output;
use crate::prompt::{build_classification_prompt, StructuredInput};
use crate::ClassifyError;

/// Minimum description length when structured title/company/category
/// context accompanies the text.
pub const MIN_CHARS_WITH_CONTEXT: usize = 20;
/// Minimum description length with no structured context.
pub const MIN_CHARS_BARE: usize = 50;

const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const TRANSPORT_RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub default_model: String,
    /// Per-source model overrides for A/B runs, keyed by source tag.
    pub model_overrides: HashMap<String, String>,
    pub max_tokens: u32,
    pub max_transport_retries: usize,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            model_overrides: HashMap::new(),
            max_tokens: DEFAULT_MAX_TOKENS,
            max_transport_retries: 2,
        }
    }
}

impl GatewaySettings {
    /// `CLASSIFIER_MODEL` sets the default; `CLASSIFIER_MODEL_OVERRIDES`
    /// takes `source=model` pairs separated by commas.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(model) = std::env::var("CLASSIFIER_MODEL") {
            if !model.is_empty() {
                settings.default_model = model;
            }
        }
        if let Ok(overrides) = std::env::var("CLASSIFIER_MODEL_OVERRIDES") {
            for pair in overrides.split(',') {
                if let Some((source, model)) = pair.split_once('=') {
                    settings
                        .model_overrides
                        .insert(source.trim().to_string(), model.trim().to_string());
                }
            }
        }
        settings
    }
}

/// USD per million tokens, (input, output), keyed by model prefix.
fn model_costs(model: &str) -> (f64, f64) {
    if model.starts_with("claude-3-5-haiku") {
        (0.80, 4.00)
    } else if model.starts_with("claude-3-5-sonnet") {
        (3.00, 15.00)
    } else {
        // Unknown models are billed at the haiku rate until added here.
        (0.80, 4.00)
    }
}

pub struct ClassifierGateway {
    client: Arc<dyn ClassifierClient>,
    settings: GatewaySettings,
    /// `job_subfamily → job_family`; the LLM's own family is advisory.
    family_table: HashMap<String, String>,
}

impl ClassifierGateway {
    pub fn new(
        client: Arc<dyn ClassifierClient>,
        settings: GatewaySettings,
        family_table: HashMap<String, String>,
    ) -> Self {
        Self {
            client,
            settings,
            family_table,
        }
    }

    fn model_for(&self, source_tag: &str) -> &str {
        self.settings
            .model_overrides
            .get(source_tag)
            .unwrap_or(&self.settings.default_model)
    }

    /// Classify one posting. No RPC is made for text below the gate.
    pub async fn classify(
        &self,
        raw_text: &str,
        structured: &StructuredInput,
        source_tag: &str,
    ) -> Result<(Classification, CostMeta), ClassifyError> {
        let trimmed = raw_text.trim();
        let minimum = if structured.has_context() {
            MIN_CHARS_WITH_CONTEXT
        } else {
            MIN_CHARS_BARE
        };
        if trimmed.chars().count() < minimum {
            return Err(ClassifyError::ContentTooShort {
                minimum,
                actual: trimmed.chars().count(),
            });
        }

        let model = self.model_for(source_tag).to_string();
        let request = CompletionRequest {
            model: model.clone(),
            prompt: build_classification_prompt(trimmed, structured),
            max_tokens: self.settings.max_tokens,
        };

        let started = Instant::now();
        let mut attempt = 0usize;
        let response = loop {
            match self.client.complete(&request).await {
                Ok(response) => break response,
                Err(ClientError::RateLimited) => return Err(ClassifyError::RateLimited),
                Err(ClientError::BadResponse(detail)) => {
                    return Err(ClassifyError::TransportError(detail))
                }
                Err(ClientError::Transport(detail)) => {
                    if attempt >= self.settings.max_transport_retries {
                        return Err(ClassifyError::TransportError(detail));
                    }
                    attempt += 1;
                    warn!(attempt, %detail, "classifier transport error, retrying");
                    tokio::time::sleep(TRANSPORT_RETRY_DELAY).await;
                }
            }
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        // Schema violations are never retried; the same prompt would fail
        // the same way.
        let mut classification = parse_classifier_output(&response.text)?;
        self.overwrite_family(&mut classification);

        let (input_rate, output_rate) = model_costs(&model);
        let cost_usd = f64::from(response.input_tokens) * input_rate / 1_000_000.0
            + f64::from(response.output_tokens) * output_rate / 1_000_000.0;

        Ok((
            classification,
            CostMeta {
                input_tokens: response.input_tokens,
                output_tokens: response.output_tokens,
                cost_usd,
                latency_ms,
                provider: self.client.provider().to_string(),
                model,
            },
        ))
    }

    /// `job_family` is always the deterministic mapping of `job_subfamily`.
    /// Out-of-table subfamilies keep the classifier's family.
    fn overwrite_family(&self, classification: &mut Classification) {
        let Some(subfamily) = classification.role.job_subfamily.as_deref() else {
            return;
        };
        let subfamily = subfamily.to_lowercase();
        if subfamily == "out_of_scope" {
            classification.role.job_family = Some("out_of_scope".to_string());
        } else if let Some(family) = self.family_table.get(&subfamily) {
            classification.role.job_family = Some(family.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::CompletionResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedClient {
        calls: AtomicUsize,
        responses: Mutex<Vec<Result<CompletionResponse, ClientError>>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<Result<CompletionResponse, ClientError>>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                responses: Mutex::new(responses),
            }
        }

        fn replying(text: &str) -> Self {
            Self::new(vec![Ok(CompletionResponse {
                text: text.to_string(),
                input_tokens: 1000,
                output_tokens: 200,
            })])
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ClassifierClient for ScriptedClient {
        fn provider(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _request: &CompletionRequest,
        ) -> Result<CompletionResponse, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .expect("lock")
                .remove(0)
        }
    }

    fn family_table() -> HashMap<String, String> {
        HashMap::from([
            ("data_engineer".to_string(), "data".to_string()),
            ("ml_engineer".to_string(), "data".to_string()),
            ("ai_ml_pm".to_string(), "product".to_string()),
            ("core_pm".to_string(), "product".to_string()),
        ])
    }

    fn gateway(client: Arc<ScriptedClient>) -> ClassifierGateway {
        ClassifierGateway::new(client, GatewaySettings::default(), family_table())
    }

    const REPLY: &str = r#"{
        "role": {"job_family": "data", "job_subfamily": "ai_ml_pm", "seniority": "senior"},
        "location": {"working_arrangement": "hybrid"},
        "skills": [{"name": "Python"}]
    }"#;

    fn with_context() -> StructuredInput {
        StructuredInput {
            title: Some("Senior AI PM".into()),
            company: Some("Notion".into()),
            ..StructuredInput::default()
        }
    }

    #[tokio::test]
    async fn short_text_fails_without_an_rpc() {
        let client = Arc::new(ScriptedClient::replying(REPLY));
        let gateway = gateway(client.clone());

        // 19 chars with context: below the relaxed gate.
        let result = gateway
            .classify("exactly nineteen ch", &with_context(), "ashby")
            .await;
        assert!(matches!(
            result,
            Err(ClassifyError::ContentTooShort { minimum: 20, .. })
        ));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn gate_boundaries_are_inclusive() {
        let client = Arc::new(ScriptedClient::replying(REPLY));
        let gateway = gateway(client.clone());

        // Exactly 20 chars with context passes.
        let twenty = "exactly twenty chs..";
        assert_eq!(twenty.chars().count(), 20);
        gateway
            .classify(twenty, &with_context(), "ashby")
            .await
            .expect("20 chars with context classify");
        assert_eq!(client.calls(), 1);

        // 49 chars without context fails the strict gate.
        let forty_nine = "x".repeat(49);
        let result = gateway
            .classify(&forty_nine, &StructuredInput::default(), "adzuna")
            .await;
        assert!(matches!(
            result,
            Err(ClassifyError::ContentTooShort { minimum: 50, .. })
        ));
    }

    #[tokio::test]
    async fn family_is_overwritten_from_the_subfamily_table() {
        let client = Arc::new(ScriptedClient::replying(REPLY));
        let gateway = gateway(client);

        let (classification, cost) = gateway
            .classify(
                "A long enough description of an AI product role.",
                &with_context(),
                "ashby",
            )
            .await
            .expect("classify");

        // The model said family=data but ai_ml_pm maps to product.
        assert_eq!(classification.role.job_family.as_deref(), Some("product"));
        assert_eq!(cost.provider, "scripted");
        assert!((cost.cost_usd - (1000.0 * 0.80 + 200.0 * 4.00) / 1_000_000.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn out_of_scope_subfamily_forces_out_of_scope_family() {
        let client = Arc::new(ScriptedClient::replying(
            r#"{"role": {"job_family": "data", "job_subfamily": "out_of_scope"}}"#,
        ));
        let gateway = gateway(client);
        let (classification, _) = gateway
            .classify(
                "A long enough description of an unrelated role.",
                &with_context(),
                "lever",
            )
            .await
            .expect("classify");
        assert_eq!(
            classification.role.job_family.as_deref(),
            Some("out_of_scope")
        );
    }

    #[tokio::test]
    async fn transport_errors_retry_then_succeed() {
        let client = Arc::new(ScriptedClient::new(vec![
            Err(ClientError::Transport("connection reset".into())),
            Ok(CompletionResponse {
                text: REPLY.to_string(),
                input_tokens: 900,
                output_tokens: 150,
            }),
        ]));
        let gateway = gateway(client.clone());

        gateway
            .classify(
                "A long enough description of a data role.",
                &with_context(),
                "greenhouse",
            )
            .await
            .expect("classify after retry");
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn schema_violations_are_not_retried() {
        let client = Arc::new(ScriptedClient::replying(r#"{"skills": "Python"}"#));
        let gateway = gateway(client.clone());

        let result = gateway
            .classify(
                "A long enough description of a data role.",
                &with_context(),
                "greenhouse",
            )
            .await;
        assert!(matches!(result, Err(ClassifyError::SchemaViolation(_))));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn rate_limits_surface_immediately() {
        let client = Arc::new(ScriptedClient::new(vec![Err(ClientError::RateLimited)]));
        let gateway = gateway(client.clone());

        let result = gateway
            .classify(
                "A long enough description of a data role.",
                &with_context(),
                "adzuna",
            )
            .await;
        assert!(matches!(result, Err(ClassifyError::RateLimited)));
        assert_eq!(client.calls(), 1);
    }

    #[test]
    fn model_overrides_select_by_source_tag() {
        let mut settings = GatewaySettings::default();
        settings
            .model_overrides
            .insert("adzuna".to_string(), "claude-3-5-sonnet-latest".to_string());
        let gateway = ClassifierGateway::new(
            Arc::new(ScriptedClient::replying(REPLY)),
            settings,
            HashMap::new(),
        );
        assert_eq!(gateway.model_for("adzuna"), "claude-3-5-sonnet-latest");
        assert_eq!(gateway.model_for("ashby"), DEFAULT_MODEL);
    }
}
