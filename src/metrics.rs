//! Prometheus metrics for the `Matcher`, `TaskRuntime`, and `CacheLayer`.
//! Grounded in the teacher's `services/monitoring.rs` metric catalogue
//! (counters/histograms/gauges per subsystem with label dimensions), but
//! built on the `metrics`/`metrics-prometheus` facade already in this
//! crate's dependency stack rather than the teacher's direct `prometheus`
//! crate usage — the facade lets call sites fire `counter!`/`histogram!`
//! macros without threading a registry handle through every module.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Registers metric descriptions once at startup so `/metrics` scrapes
/// carry human-readable help text even before the first observation.
pub fn describe() {
    describe_counter!("tasks_enqueued_total", "Playlist transfer tasks enqueued, by kind");
    describe_counter!("tasks_completed_total", "Playlist transfer tasks reaching a terminal state, by outcome");
    describe_histogram!("task_duration_seconds", "Wall-clock time from RUNNING to a terminal state");
    describe_gauge!("tasks_in_flight", "Tasks currently RUNNING, by worker");

    describe_counter!("matcher_attempts_total", "Matcher::find_match calls, by outcome strategy");
    describe_histogram!("matcher_track_sim_score", "track_sim score of the winning candidate");

    describe_counter!("cache_requests_total", "CacheLayer reads, by tier and hit/miss");
    describe_counter!("provider_calls_total", "Outbound ProviderPort calls, by provider and operation");
    describe_counter!("provider_errors_total", "Outbound ProviderPort call failures, by provider and error kind");

    describe_counter!("recovery_sweep_failed_total", "Tasks transitioned to FAILED by a recovery sweep");
}

pub fn task_enqueued(kind: &'static str) {
    counter!("tasks_enqueued_total", "kind" => kind).increment(1);
}

pub fn task_completed(kind: &'static str, outcome: &'static str, duration_secs: f64) {
    counter!("tasks_completed_total", "kind" => kind, "outcome" => outcome).increment(1);
    histogram!("task_duration_seconds", "kind" => kind).record(duration_secs);
}

pub fn tasks_in_flight(worker_id: &str, delta: i64) {
    gauge!("tasks_in_flight", "worker" => worker_id.to_string()).increment(delta as f64);
}

pub fn matcher_attempt(strategy: &'static str) {
    counter!("matcher_attempts_total", "strategy" => strategy).increment(1);
}

pub fn matcher_score(score: f64) {
    histogram!("matcher_track_sim_score").record(score);
}

pub fn cache_request(tier: &'static str, hit: bool) {
    counter!("cache_requests_total", "tier" => tier, "result" => if hit { "hit" } else { "miss" }).increment(1);
}

pub fn provider_call(provider: &str, operation: &'static str) {
    counter!("provider_calls_total", "provider" => provider.to_string(), "operation" => operation).increment(1);
}

pub fn provider_error(provider: &str, error_kind: &'static str) {
    counter!("provider_errors_total", "provider" => provider.to_string(), "error_kind" => error_kind).increment(1);
}

pub fn recovery_sweep_failed(count: u64) {
    counter!("recovery_sweep_failed_total").increment(count);
}
