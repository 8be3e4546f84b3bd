//! Prometheus Metrics Module
//!
//! Exposes pipeline metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Quotes**: Quote requests by outcome, retries by reason, limiter rejections
//! - **Directory**: Directory fetch attempts by outcome
//! - **Hydration**: Run duration and source, unassigned pool size
//! - **Assignments**: Assignment requests by outcome
//!
//! Recording functions are safe to call before [`init_metrics`]; the
//! `metrics` facade drops samples until a recorder is installed.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

static METRICS_INSTALLED: OnceLock<SocketAddr> = OnceLock::new();

/// Install the Prometheus recorder and its HTTP listener on `port`.
///
/// Returns the bound address, or `None` when `port` is 0. Subsequent calls
/// are no-ops returning the first address. Must run inside a Tokio runtime.
///
/// # Errors
///
/// Returns the exporter build error if the recorder or listener cannot be
/// installed.
pub fn init_metrics(port: u16) -> Result<Option<SocketAddr>, BuildError> {
    if port == 0 {
        return Ok(None);
    }
    if let Some(addr) = METRICS_INSTALLED.get() {
        return Ok(Some(*addr));
    }

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    register_metrics();

    Ok(Some(*METRICS_INSTALLED.get_or_init(|| addr)))
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "stock_tracker_quote_requests_total",
        "Quote lookups by final outcome"
    );
    describe_counter!(
        "stock_tracker_quote_retries_total",
        "Quote request retries by reason"
    );
    describe_counter!(
        "stock_tracker_rate_limit_rejections_total",
        "Callers rejected because the limiter queue was full"
    );
    describe_counter!(
        "stock_tracker_directory_attempts_total",
        "Symbol directory download attempts by outcome"
    );
    describe_histogram!(
        "stock_tracker_hydration_seconds",
        "Duration of hydration runs"
    );
    describe_counter!(
        "stock_tracker_hydrations_total",
        "Hydration runs by source"
    );
    describe_gauge!(
        "stock_tracker_unassigned_pool_size",
        "Symbols waiting in the unassigned pool"
    );
    describe_counter!(
        "stock_tracker_assignments_total",
        "Assignment requests by outcome"
    );
}

// =============================================================================
// Labels
// =============================================================================

/// Final outcome of a quote lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteOutcome {
    /// Quote returned.
    Success,
    /// Non-retryable rejection (4xx, malformed body, queue full).
    Rejected,
    /// Retries exhausted.
    Exhausted,
    /// Cancelled.
    Cancelled,
}

impl QuoteOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Rejected => "rejected",
            Self::Exhausted => "exhausted",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Why a quote request was retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// Transport failure.
    Network,
    /// HTTP 429.
    Throttled,
    /// HTTP 5xx.
    ServerError,
}

impl RetryReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Throttled => "throttled",
            Self::ServerError => "server_error",
        }
    }
}

/// Outcome of an assignment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOutcome {
    /// A new record was bound.
    Assigned,
    /// The existing binding was returned.
    Existing,
    /// Pool empty.
    Exhausted,
}

impl AssignmentOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Assigned => "assigned",
            Self::Existing => "existing",
            Self::Exhausted => "exhausted",
        }
    }
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record the final outcome of a quote lookup.
pub fn record_quote_request(outcome: QuoteOutcome) {
    counter!(
        "stock_tracker_quote_requests_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record a quote retry.
pub fn record_quote_retry(reason: RetryReason) {
    counter!(
        "stock_tracker_quote_retries_total",
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record a limiter queue-full rejection.
pub fn record_rate_limit_rejection() {
    counter!("stock_tracker_rate_limit_rejections_total").increment(1);
}

/// Record a directory download attempt.
pub fn record_directory_attempt(success: bool) {
    counter!(
        "stock_tracker_directory_attempts_total",
        "outcome" => if success { "success" } else { "failure" }
    )
    .increment(1);
}

/// Record a completed hydration run.
pub fn record_hydration(source: &'static str, elapsed: Duration) {
    counter!("stock_tracker_hydrations_total", "source" => source).increment(1);
    histogram!("stock_tracker_hydration_seconds", "source" => source)
        .record(elapsed.as_secs_f64());
}

/// Update the unassigned pool gauge.
pub fn set_pool_size(size: usize) {
    gauge!("stock_tracker_unassigned_pool_size").set(size as f64);
}

/// Record an assignment request.
pub fn record_assignment(outcome: AssignmentOutcome) {
    counter!(
        "stock_tracker_assignments_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_values_are_snake_case() {
        assert_eq!(QuoteOutcome::Exhausted.as_str(), "exhausted");
        assert_eq!(RetryReason::ServerError.as_str(), "server_error");
        assert_eq!(AssignmentOutcome::Existing.as_str(), "existing");
    }

    #[test]
    fn disabled_port_installs_nothing() {
        assert_eq!(init_metrics(0).unwrap(), None);
    }

    #[test]
    fn recording_without_recorder_is_a_no_op() {
        record_quote_request(QuoteOutcome::Success);
        record_hydration("cache", Duration::from_millis(5));
        set_pool_size(3);
    }
}
