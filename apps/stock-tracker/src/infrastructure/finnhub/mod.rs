//! Finnhub Quote Client
//!
//! `GET {base}/quote?symbol=SYM` with the token in `X-Finnhub-Token`.
//! Every attempt first passes the shared [`RateLimiter`].
//!
//! # Status handling
//!
//! | Status | Action |
//! |--------|--------|
//! | 2xx    | parse `c` / `t` / `v` |
//! | 429    | retry after `Retry-After` (seconds or HTTP date), else backoff |
//! | 5xx    | retry after backoff |
//! | other  | fail, no retry |

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::{ACCEPT, HeaderValue, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{Quote, QuoteError, QuoteProviderPort};
use crate::domain::retry::{RetryDecision, RetryPolicy};
use crate::infrastructure::config::{ApiToken, QuoteSettings};
use crate::infrastructure::metrics::{self, QuoteOutcome, RetryReason};
use crate::infrastructure::rate_limit::RateLimiter;

const TOKEN_HEADER: &str = "X-Finnhub-Token";

/// How a response status is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 2xx.
    Success,
    /// 429.
    Throttled,
    /// 5xx.
    Retryable,
    /// Anything else.
    Fatal,
}

/// Classify a response status.
#[must_use]
pub fn classify_status(status: StatusCode) -> StatusClass {
    if status.is_success() {
        StatusClass::Success
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        StatusClass::Throttled
    } else if status.is_server_error() {
        StatusClass::Retryable
    } else {
        StatusClass::Fatal
    }
}

/// Interpret a `Retry-After` header as a positive delay.
///
/// Accepts delta-seconds or an HTTP date, the latter measured from `now`.
#[must_use]
pub fn parse_retry_after(value: Option<&HeaderValue>, now: DateTime<Utc>) -> Option<Duration> {
    let raw = value?.to_str().ok()?.trim();

    if let Ok(seconds) = raw.parse::<u64>() {
        return (seconds > 0).then(|| Duration::from_secs(seconds));
    }

    let at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    (at - now).to_std().ok().filter(|delay| !delay.is_zero())
}

/// Parse a quote body.
///
/// The body must be a JSON object. Missing or mistyped fields fall back to
/// zero (price, volume) or `now` (time).
pub fn parse_quote(body: &str, now: DateTime<Utc>) -> Result<Quote, QuoteError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| QuoteError::Malformed(e.to_string()))?;
    let fields = value
        .as_object()
        .ok_or_else(|| QuoteError::Malformed("expected a JSON object".to_string()))?;

    let price = fields.get("c").and_then(decimal_from_json).unwrap_or_default();
    let market_time = fields
        .get("t")
        .and_then(Value::as_i64)
        .filter(|&t| t > 0)
        .and_then(|t| Utc.timestamp_opt(t, 0).single())
        .unwrap_or(now);
    let volume = fields.get("v").and_then(Value::as_f64).unwrap_or_default();

    Ok(Quote {
        name: None,
        price,
        market_time,
        volume,
    })
}

fn decimal_from_json(value: &Value) -> Option<Decimal> {
    let Value::Number(number) = value else {
        return None;
    };
    let text = number.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Rate-limited, retrying Finnhub client.
#[derive(Debug, Clone)]
pub struct FinnhubQuoteClient {
    client: Client,
    quote_url: String,
    token: ApiToken,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl FinnhubQuoteClient {
    /// Create a client sharing `limiter`.
    pub fn new(settings: &QuoteSettings, limiter: Arc<RateLimiter>) -> Result<Self, QuoteError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| QuoteError::Client(e.to_string()))?;

        Ok(Self {
            client,
            quote_url: format!("{}/quote", settings.base_url.trim_end_matches('/')),
            token: settings.token.clone(),
            limiter,
            retry: RetryPolicy::quotes(),
        })
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn attempt(&self, symbol: &str) -> Result<Quote, QuoteError> {
        let response = self
            .client
            .get(&self.quote_url)
            .query(&[("symbol", symbol)])
            .header(TOKEN_HEADER, self.token.expose())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| QuoteError::Network(e.to_string()))?;

        let status = response.status();
        match classify_status(status) {
            StatusClass::Success => {}
            StatusClass::Throttled => {
                let retry_after = parse_retry_after(response.headers().get(RETRY_AFTER), Utc::now());
                return Err(QuoteError::Throttled { retry_after });
            }
            StatusClass::Retryable => {
                return Err(QuoteError::Server {
                    status: status.as_u16(),
                });
            }
            StatusClass::Fatal => {
                return Err(QuoteError::Http {
                    status: status.as_u16(),
                });
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| QuoteError::Network(e.to_string()))?;
        parse_quote(&body, Utc::now())
    }

    async fn fetch(&self, symbol: &str, cancel: &CancellationToken) -> Result<Quote, QuoteError> {
        let mut backoff = self.retry.backoff();

        loop {
            self.limiter.acquire(cancel).await?;

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(QuoteError::Cancelled),
                result = self.attempt(symbol) => result,
            };

            let error = match result {
                Ok(quote) => return Ok(quote),
                Err(error) if !error.is_retryable() => return Err(error),
                Err(error) => error,
            };

            match backoff.on_failure_with_hint(error.retry_after()) {
                RetryDecision::RetryAfter(delay) => {
                    metrics::record_quote_retry(retry_reason(&error));
                    tracing::warn!(
                        symbol,
                        error = %error,
                        attempt = backoff.failures(),
                        delay_ms = delay.as_millis() as u64,
                        "Quote request failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(QuoteError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::GiveUp => {
                    return Err(QuoteError::Exhausted {
                        symbol: symbol.to_string(),
                        attempts: backoff.failures(),
                        last_error: error.to_string(),
                    });
                }
            }
        }
    }
}

const fn retry_reason(error: &QuoteError) -> RetryReason {
    match error {
        QuoteError::Throttled { .. } => RetryReason::Throttled,
        QuoteError::Server { .. } => RetryReason::ServerError,
        _ => RetryReason::Network,
    }
}

#[async_trait]
impl QuoteProviderPort for FinnhubQuoteClient {
    #[tracing::instrument(skip(self, cancel))]
    async fn get_quote(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<Quote, QuoteError> {
        let result = self.fetch(symbol, cancel).await;

        let outcome = match &result {
            Ok(_) => QuoteOutcome::Success,
            Err(QuoteError::Cancelled) => QuoteOutcome::Cancelled,
            Err(QuoteError::Exhausted { .. }) => QuoteOutcome::Exhausted,
            Err(_) => QuoteOutcome::Rejected,
        };
        metrics::record_quote_request(outcome);

        if let Err(error) = &result {
            tracing::warn!(error = %error, "Quote lookup failed");
        }
        result
    }
}
