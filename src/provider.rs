//! Shared HTTP plumbing for model providers.
//!
//! Both the embedding and chat-completion clients POST JSON and read JSON
//! back. Failures are classified once here so that every provider reports
//! the same `retryable` semantics.

use std::time::Duration;

use crate::error::{classify_reqwest, classify_status, RagError, Result};

/// Build a client whose every request is bounded by `timeout_secs`.
pub(crate) fn build_client(provider: &str, timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| RagError::Config(format!("failed to build {} HTTP client: {}", provider, e)))
}

/// Send the request built by `request`, retrying transient failures.
///
/// Backoff between attempts: 1s, 2s, 4s, ... capped at 32s. Non-retryable
/// failures (4xx other than 429, undecodable bodies) return immediately.
pub(crate) async fn post_json_with_retry<F>(
    provider: &str,
    max_retries: u32,
    request: F,
) -> Result<serde_json::Value>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1u64 << (attempt - 1).min(5));
            tracing::debug!(provider, attempt, ?delay, "retrying provider call");
            tokio::time::sleep(delay).await;
        }

        let err = match request().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return response.json::<serde_json::Value>().await.map_err(|e| {
                        RagError::provider(provider, format!("invalid response body: {}", e), false)
                    });
                }
                let body = response.text().await.unwrap_or_default();
                classify_status(provider, status, &body)
            }
            Err(e) => classify_reqwest(provider, &e),
        };

        if !err.is_retryable() {
            return Err(err);
        }
        tracing::warn!(provider, attempt, error = %err, "transient provider failure");
        last_err = Some(err);
    }

    Err(last_err
        .unwrap_or_else(|| RagError::provider(provider, "request failed after retries", true)))
}

/// Non-retryable error for a response that does not have the expected shape.
pub(crate) fn malformed(provider: &str, what: &str) -> RagError {
    RagError::provider(provider, format!("malformed response: {}", what), false)
}
