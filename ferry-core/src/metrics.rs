// ABOUTME: Metric names and recording helpers for turns and delivery.
// ABOUTME: Uses the metrics facade; the binary decides whether an exporter is installed.

use std::time::Duration;

pub const TURNS_TOTAL: &str = "ferry_turns_total";
pub const TURN_DURATION_SECONDS: &str = "ferry_turn_duration_seconds";
pub const EDITS_TOTAL: &str = "ferry_edits_total";
pub const FORMAT_FALLBACKS_TOTAL: &str = "ferry_format_fallbacks_total";
pub const CHUNKS_SENT_TOTAL: &str = "ferry_chunks_sent_total";
pub const RATE_LIMITED_TOTAL: &str = "ferry_rate_limited_total";

/// Record a finished turn; `outcome` is "success", "error", or "not_started"
pub fn record_turn(outcome: &'static str, duration: Duration) {
    metrics::counter!(TURNS_TOTAL, "outcome" => outcome).increment(1);
    metrics::histogram!(TURN_DURATION_SECONDS).record(duration.as_secs_f64());
}

pub fn record_edit() {
    metrics::counter!(EDITS_TOTAL).increment(1);
}

pub fn record_format_fallback() {
    metrics::counter!(FORMAT_FALLBACKS_TOTAL).increment(1);
}

pub fn record_chunk_sent() {
    metrics::counter!(CHUNKS_SENT_TOTAL).increment(1);
}

pub fn record_rate_limited() {
    metrics::counter!(RATE_LIMITED_TOTAL).increment(1);
}
