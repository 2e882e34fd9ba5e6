//! HTTP client for the settlement service

use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::domain::OrderNumber;

use super::{AccrualError, AccrualResponse, AccrualResult, AccrualSource, BackoffPolicy};

/// Settlement client configuration
#[derive(Debug, Clone)]
pub struct AccrualClientConfig {
    /// Service base URL, e.g. `http://localhost:8081`
    pub base_url: String,
    /// Deadline for a single HTTP request
    pub request_timeout: Duration,
    /// Budget for 429 responses
    pub rate_limit: BackoffPolicy,
    /// Budget for 5xx and transport failures
    pub retry: BackoffPolicy,
}

impl Default for AccrualClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".to_string(),
            request_timeout: Duration::from_secs(5),
            rate_limit: BackoffPolicy::default().with_max_attempts(5),
            retry: BackoffPolicy::default(),
        }
    }
}

/// Longest `Retry-After` taken at face value
const MAX_RETRY_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

/// One request's classified reply
enum Reply {
    Done(AccrualResult),
    RateLimited(Option<Duration>),
    ServerError(StatusCode),
}

/// Settlement client shared by every reconciliation worker.
///
/// A 429 pauses the whole client, not just the order that saw it: the
/// service limits the caller.
pub struct AccrualClient {
    http: Client,
    base_url: String,
    rate_limit: BackoffPolicy,
    retry: BackoffPolicy,
    paused_until: Arc<Mutex<Option<Instant>>>,
}

impl AccrualClient {
    pub fn new(config: AccrualClientConfig) -> Result<Self, AccrualError> {
        let http = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            rate_limit: config.rate_limit,
            retry: config.retry,
            paused_until: Arc::new(Mutex::new(None)),
        })
    }

    fn order_url(&self, number: &OrderNumber) -> String {
        format!("{}/api/orders/{}", self.base_url, number)
    }

    /// Push the shared pause out to at least `delay` from now
    fn pause_for(&self, delay: Duration) {
        let now = Instant::now();
        let until = now.checked_add(delay).unwrap_or(now + MAX_RETRY_AFTER);
        let mut paused = self.paused_until.lock().unwrap_or_else(PoisonError::into_inner);
        if paused.map_or(true, |current| current < until) {
            *paused = Some(until);
        }
    }

    async fn wait_until_resumed(&self) {
        loop {
            let until = *self.paused_until.lock().unwrap_or_else(PoisonError::into_inner);
            match until {
                Some(until) if until > Instant::now() => tokio::time::sleep_until(until).await,
                _ => return,
            }
        }
    }

    async fn send(&self, number: &OrderNumber) -> Result<Reply, AccrualError> {
        let response = self.http.get(self.order_url(number)).send().await?;
        classify(response, number).await
    }
}

async fn classify(response: Response, number: &OrderNumber) -> Result<Reply, AccrualError> {
    let status = response.status();
    match status {
        StatusCode::OK => {
            let body = response.text().await?;
            let parsed: AccrualResponse = serde_json::from_str(&body)
                .map_err(|e| AccrualError::MalformedResponse(e.to_string()))?;
            Ok(Reply::Done(parsed.into_result(number)?))
        }
        StatusCode::NO_CONTENT => Ok(Reply::Done(AccrualResult::Unregistered)),
        StatusCode::TOO_MANY_REQUESTS => Ok(Reply::RateLimited(retry_after(&response))),
        s if s.is_server_error() => Ok(Reply::ServerError(s)),
        s => Err(AccrualError::UnexpectedStatus(s.as_u16())),
    }
}

/// `Retry-After` in delta-seconds, clamped to [`MAX_RETRY_AFTER`]; HTTP-date
/// values are ignored
fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|seconds| Duration::from_secs(seconds).min(MAX_RETRY_AFTER))
}

#[async_trait]
impl AccrualSource for AccrualClient {
    async fn fetch_status(&self, number: &OrderNumber) -> Result<AccrualResult, AccrualError> {
        let started = Instant::now();
        let mut rate_limited = 0u32;
        let mut failures = 0u32;

        loop {
            self.wait_until_resumed().await;

            match self.send(number).await {
                Ok(Reply::Done(result)) => return Ok(result),
                Ok(Reply::RateLimited(hint)) => {
                    rate_limited += 1;
                    let next = self
                        .rate_limit
                        .next_delay(rate_limited, started.elapsed(), hint);
                    let Some(delay) = next else {
                        return Err(AccrualError::RateLimited {
                            attempts: rate_limited,
                        });
                    };
                    tracing::warn!(
                        order = %number,
                        delay_ms = delay.as_millis() as u64,
                        attempt = rate_limited,
                        "Settlement service rate limited, pausing"
                    );
                    self.pause_for(delay);
                }
                Ok(Reply::ServerError(status)) => {
                    failures += 1;
                    let next = self.retry.next_delay(failures, started.elapsed(), None);
                    let Some(delay) = next else {
                        return Err(AccrualError::Unavailable {
                            status: status.as_u16(),
                            attempts: failures,
                        });
                    };
                    tracing::warn!(
                        order = %number,
                        status = status.as_u16(),
                        delay_ms = delay.as_millis() as u64,
                        "Settlement service error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(AccrualError::Transport(e)) => {
                    failures += 1;
                    let next = self.retry.next_delay(failures, started.elapsed(), None);
                    let Some(delay) = next else {
                        return Err(AccrualError::Transport(e));
                    };
                    tracing::warn!(
                        order = %number,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Settlement request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
