//! Prometheus metrics for the portal

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all PeerDesk metrics
pub const METRICS_PREFIX: &str = "peerdesk";

const REQUESTS_TOTAL: &str = "peerdesk_requests_total";
const REQUEST_DURATION: &str = "peerdesk_request_duration_seconds";
const TRANSITIONS_TOTAL: &str = "peerdesk_transitions_total";
const PAPERS_SUBMITTED: &str = "peerdesk_papers_submitted_total";
const AUTHORS_PROVISIONED: &str = "peerdesk_authors_provisioned_total";
const NOTIFICATIONS_FAILED: &str = "peerdesk_notifications_failed_total";

/// Request latency buckets in seconds; the upper end covers manuscript uploads
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 15.0, 30.0,
];

/// Describe every metric to the installed recorder
pub fn register_metrics() {
    describe_counter!(REQUESTS_TOTAL, Unit::Count, "HTTP requests by route and status");
    describe_histogram!(REQUEST_DURATION, Unit::Seconds, "HTTP request latency by route");

    describe_counter!(
        TRANSITIONS_TOTAL,
        Unit::Count,
        "Review workflow commands by action and outcome"
    );
    describe_counter!(PAPERS_SUBMITTED, Unit::Count, "Papers accepted for review");
    describe_counter!(
        AUTHORS_PROVISIONED,
        Unit::Count,
        "Author accounts created from anonymous submissions"
    );
    describe_counter!(
        NOTIFICATIONS_FAILED,
        Unit::Count,
        "Emails that could not be delivered, by kind"
    );

    tracing::debug!(prefix = METRICS_PREFIX, "Metric descriptions registered");
}

/// Timer for one HTTP request, labelled by method and route template
pub struct RequestMetrics {
    started: Instant,
    labels: [(&'static str, String); 2],
}

impl RequestMetrics {
    pub fn start(method: &str, route: &str) -> Self {
        Self {
            started: Instant::now(),
            labels: [("method", method.to_owned()), ("route", route.to_owned())],
        }
    }

    /// Count the request under its response status and record its latency
    pub fn finish(self, status: u16) {
        let elapsed = self.started.elapsed().as_secs_f64();
        let [(_, method), (_, route)] = self.labels;

        counter!(
            REQUESTS_TOTAL,
            "method" => method.clone(),
            "route" => route.clone(),
            "status" => status.to_string()
        )
        .increment(1);
        histogram!(REQUEST_DURATION, "method" => method, "route" => route).record(elapsed);
    }
}

/// Record the outcome of a workflow command
pub fn record_transition(action: &'static str, outcome: &'static str) {
    counter!(TRANSITIONS_TOTAL, "action" => action, "outcome" => outcome).increment(1);
}

/// Record an accepted submission
pub fn record_submission(provisioned_author: bool) {
    counter!(PAPERS_SUBMITTED).increment(1);
    if provisioned_author {
        counter!(AUTHORS_PROVISIONED).increment(1);
    }
}

/// Record an email that failed to send
pub fn record_notification_failure(kind: &'static str) {
    counter!(NOTIFICATIONS_FAILED, "kind" => kind).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets_sorted() {
        assert!(LATENCY_BUCKETS.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_metric_names_share_prefix() {
        for name in [
            REQUESTS_TOTAL,
            REQUEST_DURATION,
            TRANSITIONS_TOTAL,
            PAPERS_SUBMITTED,
            AUTHORS_PROVISIONED,
            NOTIFICATIONS_FAILED,
        ] {
            assert!(name.starts_with(METRICS_PREFIX));
        }
    }

    #[test]
    fn test_recorders_without_exporter() {
        // No global recorder installed: calls are no-ops and must not panic
        RequestMetrics::start("POST", "/api/papers/assign").finish(200);
        record_transition("assign_reviewer", "ok");
        record_submission(true);
        record_notification_failure("reviewer_assigned");
    }
}
