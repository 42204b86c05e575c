use tracing::trace;

// Trace-based counters; the Prometheus recorder only backs `/metrics`.

pub fn inc_requests(route: &'static str) {
    trace!(
        target = "campaign.metrics",
        route = route,
        "requests_total_inc"
    );
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target = "campaign.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}

pub fn delivery_outcome(delivered: bool) {
    trace!(
        target = "campaign.metrics",
        outcome = if delivered { "delivered" } else { "failed" },
        "deliveries_total_inc"
    );
}
