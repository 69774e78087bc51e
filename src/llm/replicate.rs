use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::llm::media::download_image;
use crate::llm::openai::summarize_error_body;
use crate::llm::{ImageBackend, SynthesisError, SynthesisRequest};
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

// Replicate caps synchronous waits at 60 seconds; longer runs are polled.
const PREFER_WAIT_SECONDS: u64 = 60;

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(default)]
    id: Option<String>,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    #[serde(default)]
    get: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PredictionState {
    Succeeded,
    Failed,
    Pending,
}

fn prediction_state(status: &str) -> PredictionState {
    match status {
        "succeeded" => PredictionState::Succeeded,
        "failed" | "canceled" | "aborted" => PredictionState::Failed,
        _ => PredictionState::Pending,
    }
}

/// The model returns either a single URL or a list whose first element is the URL.
fn extract_output_url(output: Option<&Value>) -> Option<String> {
    match output? {
        Value::String(url) if !url.trim().is_empty() => Some(url.trim().to_string()),
        Value::Array(items) => items
            .first()
            .and_then(|item| item.as_str())
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty()),
        _ => None,
    }
}

fn describe_prediction_error(prediction: &Prediction) -> String {
    match &prediction.error {
        Some(Value::String(message)) => message.clone(),
        Some(Value::Null) | None => format!("prediction {}", prediction.status),
        Some(other) => other.to_string(),
    }
}

/// Predictions client for the Replicate HTTP API.
#[derive(Debug, Clone)]
pub struct ReplicateClient {
    base_url: String,
    api_token: String,
    model: String,
    timeout: Duration,
    poll_interval: Duration,
    download_timeout: Duration,
}

impl ReplicateClient {
    pub fn new(base_url: &str, api_token: &str, model: &str) -> Self {
        ReplicateClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
            model: model.trim().to_string(),
            timeout: Duration::from_secs(180),
            poll_interval: Duration::from_secs(1),
            download_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeouts(
        mut self,
        timeout: Duration,
        poll_interval: Duration,
        download_timeout: Duration,
    ) -> Self {
        self.timeout = timeout;
        self.poll_interval = poll_interval;
        self.download_timeout = download_timeout;
        self
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.replicate_base_url,
            &config.replicate_api_token,
            &config.image_model,
        )
        .with_timeouts(
            config.synthesis_timeout(),
            config.synthesis_poll_interval(),
            config.image_download_timeout(),
        )
    }

    fn build_create_request(&self, request: &SynthesisRequest) -> (String, Value) {
        let input = json!({
            "prompt": request.prompt,
            "aspect_ratio": request.aspect_ratio,
            "negative_prompt": request.negative_prompt,
            "steps": request.steps,
            "seed": request.seed,
        });

        // "owner/name:version" pins a specific version; "owner/name" runs the latest.
        match self.model.split_once(':') {
            Some((_, version)) => (
                format!("{}/predictions", self.base_url),
                json!({ "version": version, "input": input }),
            ),
            None => (
                format!("{}/models/{}/predictions", self.base_url, self.model),
                json!({ "input": input }),
            ),
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> SynthesisError {
        if err.is_timeout() {
            SynthesisError::Timeout(self.timeout.as_secs())
        } else {
            SynthesisError::Transport(err.to_string())
        }
    }

    async fn read_prediction(
        &self,
        response: reqwest::Response,
    ) -> Result<Prediction, SynthesisError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (message, body_summary) = summarize_error_body(&body);
            warn!(
                "Replicate API error: status={}, body={}",
                status, body_summary
            );
            return Err(SynthesisError::Status {
                status: status.as_u16(),
                detail: message.unwrap_or(body_summary),
            });
        }

        response
            .json::<Prediction>()
            .await
            .map_err(|err| SynthesisError::Decode(err.to_string()))
    }

    async fn create_prediction(
        &self,
        request: &SynthesisRequest,
    ) -> Result<Prediction, SynthesisError> {
        let (url, payload) = self.build_create_request(request);
        debug!("Replicate create prediction: url={}, seed={}", url, request.seed);
        let response = get_http_client()
            .post(url)
            .bearer_auth(&self.api_token)
            .header("Prefer", format!("wait={}", PREFER_WAIT_SECONDS))
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;
        self.read_prediction(response).await
    }

    async fn fetch_prediction(&self, url: &str) -> Result<Prediction, SynthesisError> {
        let response = get_http_client()
            .get(url)
            .bearer_auth(&self.api_token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;
        self.read_prediction(response).await
    }

    async fn run_prediction(&self, request: &SynthesisRequest) -> Result<String, SynthesisError> {
        let mut prediction = self.create_prediction(request).await?;
        loop {
            match prediction_state(&prediction.status) {
                PredictionState::Succeeded => {
                    return extract_output_url(prediction.output.as_ref())
                        .ok_or(SynthesisError::MissingOutput);
                }
                PredictionState::Failed => {
                    return Err(SynthesisError::Failed(describe_prediction_error(&prediction)));
                }
                PredictionState::Pending => {}
            }

            let Some(poll_url) = prediction.urls.as_ref().and_then(|urls| urls.get.clone()) else {
                return Err(SynthesisError::Decode(format!(
                    "prediction {} is {} but has no poll URL",
                    prediction.id.as_deref().unwrap_or("unknown"),
                    prediction.status
                )));
            };
            debug!(
                "Replicate prediction {} is {}; polling",
                prediction.id.as_deref().unwrap_or("unknown"),
                prediction.status
            );
            tokio::time::sleep(self.poll_interval).await;
            prediction = self.fetch_prediction(&poll_url).await?;
        }
    }
}

#[async_trait]
impl ImageBackend for ReplicateClient {
    async fn render(&self, request: &SynthesisRequest) -> Result<Option<Vec<u8>>, SynthesisError> {
        let metadata = json!({ "seed": request.seed, "steps": request.steps });
        let image_url = log_llm_timing(
            "replicate",
            &self.model,
            "synthesize",
            Some(metadata),
            || async {
                tokio::time::timeout(self.timeout, self.run_prediction(request))
                    .await
                    .map_err(|_| SynthesisError::Timeout(self.timeout.as_secs()))?
            },
        )
        .await?;

        info!("Replicate produced image at {}", image_url);
        Ok(download_image(&image_url, self.download_timeout).await)
    }
}
