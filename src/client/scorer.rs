//! Span scoring client.
//!
//! Epistemic foundation:
//! - K_i: A QA model maps token IDs to per-token start/end logits
//! - B_i: Endpoint will respond within timeout (might fail)
//! - B_i: Response matches the batch shape (might not) → ShapeMismatch
//! - I^B: Network availability unknowable → retry with backoff

use crate::inference::check_scores_shape;
use crate::models::{EncodedBatch, InferenceConfig, QaError, Result, ScorerError, SpanScores};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Produces start/end scores for a tokenized batch.
#[async_trait]
pub trait SpanScorer: Send + Sync {
    async fn score(&self, batch: &EncodedBatch) -> Result<SpanScores>;
}

/// Request payload for the scoring endpoint.
#[derive(Debug, Serialize)]
struct ScoreRequest<'a> {
    model: &'a str,
    input_ids: &'a [Vec<u32>],
    attention_mask: &'a [Vec<u32>],
}

/// Error body returned by the endpoint.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// HTTP client for a span scoring endpoint.
///
/// POSTs `{model, input_ids, attention_mask}` and expects
/// `{start_logits, end_logits}` back.
///
/// Features:
/// - Bearer auth when an API key is configured
/// - Retry with exponential backoff on network errors and 5xx
/// - `retry-after` honored on 429
/// - No retry on other 4xx, including 401/404
pub struct HttpSpanScorer {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
    max_retries: u32,
}

impl HttpSpanScorer {
    /// Create a new scorer.
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout_secs: Option<u64>,
        max_retries: Option<u32>,
    ) -> Result<Self> {
        let timeout = Duration::from_secs(timeout_secs.unwrap_or(60));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(QaError::Network)?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
            timeout,
            max_retries: max_retries.unwrap_or(3).max(1),
        })
    }

    /// Create a scorer from the `[inference]` config section.
    pub fn from_config(config: &InferenceConfig, api_key: Option<String>) -> Result<Self> {
        Self::new(
            config.endpoint.clone(),
            config.model.clone(),
            api_key,
            Some(config.timeout_secs),
            Some(config.max_retries),
        )
    }

    /// Build headers for a request.
    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| QaError::InvalidInput(format!("API key is not a valid header: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn backoff(attempt: u32) -> Duration {
        Duration::from_secs(2u64.pow(attempt))
    }
}

/// Map a non-success response to a scorer error.
fn classify_error(status: u16, body: &str, model: &str) -> ScorerError {
    match status {
        401 => ScorerError::AuthenticationFailed,
        404 => ScorerError::ModelNotFound(model.to_string()),
        _ => {
            let message = serde_json::from_str::<ApiErrorResponse>(body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| body.to_string());
            ScorerError::ApiError { status, message }
        }
    }
}

/// Wait requested by a 429 reply, falling back to one second.
///
/// Negative, non-finite or unparsable values use the fallback.
fn retry_after(headers: &HeaderMap) -> Duration {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .unwrap_or(Duration::from_secs(1))
}

#[async_trait]
impl SpanScorer for HttpSpanScorer {
    /// B_i(endpoint available) → Result
    /// B_i(valid response) → Result
    async fn score(&self, batch: &EncodedBatch) -> Result<SpanScores> {
        let request = ScoreRequest {
            model: &self.model,
            input_ids: &batch.input_ids,
            attention_mask: &batch.attention_mask,
        };
        let headers = self.headers()?;

        for attempt in 0..self.max_retries {
            let response = self
                .client
                .post(&self.endpoint)
                .headers(headers.clone())
                .json(&request)
                .send()
                .await;

            let (error, wait) = match response {
                Err(e) => {
                    let error = if e.is_timeout() {
                        QaError::Timeout(self.timeout)
                    } else {
                        QaError::Network(e)
                    };
                    (error, Self::backoff(attempt))
                }
                Ok(r) if r.status().as_u16() == 429 => {
                    let wait = retry_after(r.headers());
                    let error = QaError::RateLimited {
                        retry_after_secs: wait.as_secs_f64(),
                    };
                    (error, wait)
                }
                Ok(r) if !r.status().is_success() => {
                    let status = r.status().as_u16();
                    let body = r.text().await.unwrap_or_default();
                    let error = QaError::ScorerApi(classify_error(status, &body, &self.model));
                    (error, Self::backoff(attempt))
                }
                Ok(r) => {
                    let scores: SpanScores = r.json().await.map_err(|e| {
                        QaError::ScorerApi(ScorerError::InvalidResponse(format!(
                            "Failed to parse response: {e}"
                        )))
                    })?;
                    check_scores_shape(batch, &scores)?;

                    debug!(rows = batch.len(), seq_len = batch.seq_len(), "Batch scored");
                    return Ok(scores);
                }
            };

            if !error.is_retryable() || attempt + 1 == self.max_retries {
                return Err(error);
            }

            debug!(
                attempt = attempt,
                wait_secs = wait.as_secs_f64(),
                error = %error,
                "Retrying scorer request"
            );
            tokio::time::sleep(wait).await;
        }

        Err(QaError::ScorerApi(ScorerError::MaxRetriesExceeded {
            attempts: self.max_retries,
            last_error: "no attempt was made".to_string(),
        }))
    }
}
