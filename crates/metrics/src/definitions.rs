//! Metric name and label definitions.
//!
//! All names carry the `courier_` prefix so they sit together on a shared
//! Prometheus server.

/// Outbound Bot API calls made by the wire client
pub mod client {
    /// Total number of Bot API calls, labelled by `method`
    pub const REQUESTS_TOTAL: &str = "courier_client_requests_total";
    /// Duration of Bot API calls in seconds
    pub const REQUEST_DURATION_SECONDS: &str = "courier_client_request_duration_seconds";
    /// Failed calls, labelled by `method` and `kind`
    pub const ERRORS_TOTAL: &str = "courier_client_errors_total";
    /// Calls re-issued after a rate-limit answer
    pub const RATE_LIMIT_RETRIES_TOTAL: &str = "courier_client_rate_limit_retries_total";
}

/// Update intake and handler execution
pub mod dispatch {
    /// Updates accepted from a source, labelled by `source`
    pub const UPDATES_RECEIVED_TOTAL: &str = "courier_updates_received_total";
    /// Updates that reached a handler, labelled by `update_type`
    pub const UPDATES_HANDLED_TOTAL: &str = "courier_updates_handled_total";
    /// Updates with no matching handler
    pub const UPDATES_DROPPED_TOTAL: &str = "courier_updates_dropped_total";
    /// Handler invocations that returned an error or panicked
    pub const HANDLER_ERRORS_TOTAL: &str = "courier_handler_errors_total";
    /// Handler execution time in seconds, excluding outbound API time
    pub const HANDLER_DURATION_SECONDS: &str = "courier_handler_duration_seconds";
    /// Updates waiting in the queue
    pub const QUEUE_DEPTH: &str = "courier_queue_depth";
    /// Workers currently running a handler
    pub const WORKERS_BUSY: &str = "courier_workers_busy";
}

/// Command menu synchronisation
pub mod commands {
    /// Scopes whose remote command list was replaced
    pub const SCOPES_UPDATED_TOTAL: &str = "courier_command_scopes_updated_total";
    /// Scopes already in sync
    pub const SCOPES_UNCHANGED_TOTAL: &str = "courier_command_scopes_unchanged_total";
}

/// Webhook receiver
pub mod webhook {
    /// Deliveries rejected, labelled by `reason`
    pub const REJECTED_TOTAL: &str = "courier_webhook_rejected_total";
}

/// Common label keys
pub mod labels {
    pub const METHOD: &str = "method";
    pub const KIND: &str = "kind";
    pub const SOURCE: &str = "source";
    pub const UPDATE_TYPE: &str = "update_type";
    pub const REASON: &str = "reason";
}

/// Histogram bucket boundaries
pub mod buckets {
    /// Bot API round trips. Long polls sit at the top of this range.
    pub const API_DURATION: [f64; 12] = [
        0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
    ];

    /// Handler execution
    pub const HANDLER_DURATION: [f64; 10] =
        [0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rstest::rstest]
    #[case(client::REQUESTS_TOTAL)]
    #[case(dispatch::UPDATES_RECEIVED_TOTAL)]
    #[case(commands::SCOPES_UPDATED_TOTAL)]
    #[case(webhook::REJECTED_TOTAL)]
    fn names_are_prefixed(#[case] name: &str) {
        assert!(name.starts_with("courier_"), "{name}");
    }

    #[test]
    fn buckets_are_sorted() {
        assert!(buckets::API_DURATION.windows(2).all(|w| w[0] < w[1]));
        assert!(buckets::HANDLER_DURATION.windows(2).all(|w| w[0] < w[1]));
    }
}
