use std::time::Duration;

use log::{debug, warn};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::{json, Value};

use super::LatraBatch;

/// Per-attempt request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Attempts per batch, including the first.
const MAX_ATTEMPTS: u32 = 3;
/// Base for the linear backoff: the delay before attempt n+1 is base * n.
const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Outcome of one batch transmission, after retries.
#[derive(Clone, Debug)]
pub struct TransmitOutcome {
    pub success: bool,
    pub response: Value,
}

/// Client for the regulator endpoint.
///
/// Stateless apart from the shared connection pool inside [`reqwest::Client`];
/// safe to call concurrently from every ingestion worker.
pub struct LatraClient {
    http: reqwest::Client,
    url: String,
    token: String,
    max_attempts: u32,
    backoff_base: Duration,
}

impl LatraClient {
    /// Creates a client for the given endpoint.
    ///
    /// # Arguments
    /// * `url` - The regulator endpoint URL
    /// * `token` - Pre-encoded HTTP basic credentials
    pub fn new(url: String, token: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");

        LatraClient {
            http,
            url,
            token,
            max_attempts: MAX_ATTEMPTS,
            backoff_base: BACKOFF_BASE,
        }
    }

    /// Overrides the retry policy. Used by tests to keep backoff short.
    pub fn with_retry_policy(mut self, max_attempts: u32, backoff_base: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.backoff_base = backoff_base;
        self
    }

    /// POSTs one batch, retrying failed attempts with linear backoff.
    ///
    /// HTTP 200 is the only success. Other statuses and transport errors are
    /// captured into the outcome's response value; the last error is returned
    /// when all attempts are exhausted.
    pub async fn send_batch(&self, batch: &LatraBatch) -> TransmitOutcome {
        let mut last_error = json!({ "error": "Max retries exceeded" });

        for attempt in 1..=self.max_attempts {
            match self.post_once(batch).await {
                Ok(response) => {
                    debug!(target: &batch.imei, "Upstream accepted batch of {} items", batch.items.len());
                    return TransmitOutcome {
                        success: true,
                        response,
                    };
                }
                Err(error) => {
                    warn!(
                        target: &batch.imei,
                        "Upstream attempt {}/{} failed: {}", attempt, self.max_attempts, error
                    );
                    last_error = error;
                }
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(self.backoff_base * attempt).await;
            }
        }

        TransmitOutcome {
            success: false,
            response: last_error,
        }
    }

    async fn post_once(&self, batch: &LatraBatch) -> Result<Value, Value> {
        let response = self
            .http
            .post(&self.url)
            .header(AUTHORIZATION, format!("Basic {}", self.token))
            .header(CONTENT_TYPE, "application/json")
            .json(batch)
            .send()
            .await
            .map_err(|err| json!({ "error": err.to_string() }))?;

        let status = response.status();
        if status == StatusCode::OK {
            return Ok(response.json::<Value>().await.unwrap_or_else(|_| json!({})));
        }

        // Failure bodies are structured JSON when the regulator produced
        // them; keep raw text otherwise.
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<Value>(&body).unwrap_or_else(|_| Value::String(body));
        Err(json!({
            "error": format!("LATRA API returned status {}", status.as_u16()),
            "detail": detail,
        }))
    }
}
