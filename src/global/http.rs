// src/global/http.rs
use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::global::config::ApiConfig;
use crate::global::error::ApiError;
use crate::global::limiter::RateLimiter;

/// Retry behaviour for rate-limited responses
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl From<&crate::global::config::RetryConfig> for RetryPolicy {
    fn from(config: &crate::global::config::RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)));
        std::cmp::min(exponential, self.max_delay)
    }
}

/// Backend responses are either bare JSON or wrapped by the response
/// formatter as `{ success, data, message }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Wrapped {
        #[allow(dead_code)]
        #[serde(default)]
        success: Option<bool>,
        data: T,
    },
    Bare(T),
}

impl<T> Envelope<T> {
    fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data, .. } => data,
            Envelope::Bare(data) => data,
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Authenticated client for the Movieo REST API.
///
/// Every request carries the current bearer token, passes through the rate
/// limiter and is retried on 429 with exponential backoff.
#[derive(Clone)]
pub struct MovieoClient {
    client: Client,
    base_url: String,
    token: Arc<RwLock<Option<String>>>,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

impl std::fmt::Debug for MovieoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MovieoClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.has_token())
            .field("limiter", &self.limiter)
            .finish()
    }
}

impl MovieoClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ApiError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: Arc::new(RwLock::new(config.token.clone().filter(|t| !t.is_empty()))),
            limiter: RateLimiter::new("movieo_api", config.rate_limit),
            retry: RetryPolicy::from(&config.retry),
        })
    }

    /// Replace the bearer token used for subsequent requests
    pub fn set_token(&self, token: impl Into<String>) {
        let token = token.into();
        let mut guard = self.token.write().unwrap_or_else(|e| e.into_inner());
        *guard = if token.is_empty() { None } else { Some(token) };
    }

    pub fn has_token(&self) -> bool {
        self.token.read().map(|t| t.is_some()).unwrap_or(false)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn bearer(&self) -> Result<String, ApiError> {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| ApiError::Auth("no bearer credential configured".to_string()))
    }

    /// GET and decode a JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let response = self
            .send(path, |client, url, token| {
                client.request(Method::GET, url).bearer_auth(token).query(query)
            })
            .await?;
        decode(response).await
    }

    /// PUT a JSON body and decode the JSON reply
    pub async fn put_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self
            .send(path, |client, url, token| {
                client.request(Method::PUT, url).bearer_auth(token).json(body)
            })
            .await?;
        decode(response).await
    }

    /// POST without a body; the reply body is ignored
    pub async fn post(&self, path: &str) -> Result<(), ApiError> {
        self.send(path, |client, url, token| {
            client.request(Method::POST, url).bearer_auth(token)
        })
        .await?;
        Ok(())
    }

    /// Send a request built by `build`, retrying on 429.
    /// Returns the response only for 2xx statuses.
    async fn send<F>(&self, path: &str, build: F) -> Result<Response, ApiError>
    where
        F: Fn(&Client, String, &str) -> RequestBuilder,
    {
        let token = self.bearer()?;
        let url = self.url(path);
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.limiter.acquire().await;

            debug!(
                url = %url,
                attempt = attempt,
                max_attempts = self.retry.max_retries + 1,
                "Sending request"
            );

            let response = build(&self.client, url.clone(), &token).send().await.map_err(|e| {
                warn!(url = %url, error = %e, "Request failed");
                ApiError::from(e)
            })?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt > self.retry.max_retries {
                    warn!(url = %url, "Max retries exceeded after rate limit");
                    return Err(ApiError::Network(format!(
                        "rate limited by server after {} attempts",
                        attempt
                    )));
                }

                let delay = parse_retry_after(&response).unwrap_or_else(|| self.retry.backoff(attempt));
                debug!(url = %url, delay = ?delay, "Rate limited, backing off");
                tokio::time::sleep(delay).await;
                continue;
            }

            let message = error_message(response).await;
            warn!(url = %url, status = status.as_u16(), message = %message, "Request rejected");
            return Err(classify(status, message));
        }
    }
}

/// Map a non-success status onto the error taxonomy
fn classify(status: StatusCode, message: String) -> ApiError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Auth(message),
        StatusCode::NOT_FOUND => ApiError::NotFound(message),
        s if s.is_client_error() => ApiError::Validation(message),
        s => ApiError::Network(format!("server returned {}: {}", s.as_u16(), message)),
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let url = response.url().to_string();
    let bytes = response.bytes().await?;

    serde_json::from_slice::<Envelope<T>>(&bytes)
        .map(Envelope::into_inner)
        .map_err(|e| {
            warn!(url = %url, error = %e, "Deserialization failed");
            ApiError::InvalidResponse(e.to_string())
        })
}

async fn error_message(response: Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.message.or(body.error))
        .or_else(|| (!text.trim().is_empty()).then(|| text.trim().to_string()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string())
}

/// Parse the Retry-After header if present (seconds form only)
fn parse_retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
