use metrics::{counter, histogram};
use tracing::trace;

pub const REQUESTS_TOTAL: &str = "orchestrator_requests_total";
pub const STAGE_ELAPSED_MS: &str = "orchestrator_stage_elapsed_ms";
pub const STAGE_FAILURES_TOTAL: &str = "orchestrator_stage_failures_total";

/// Counts an inbound request against `route`, before the body is parsed.
pub fn record_request(route: &'static str) {
    counter!(REQUESTS_TOTAL, "route" => route).increment(1);
    trace!(target = "orchestrator.telemetry", route, "request_recorded");
}

pub fn record_stage(stage: &'static str, elapsed_ms: u128, failed: bool) {
    histogram!(STAGE_ELAPSED_MS, "stage" => stage).record(elapsed_ms as f64);
    if failed {
        counter!(STAGE_FAILURES_TOTAL, "stage" => stage).increment(1);
    }
}
