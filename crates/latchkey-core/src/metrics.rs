// Lock metrics
// Counters, gauges and histograms published through the `metrics` facade

use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

use crate::coordinator::Votes;
use crate::node::NodeOp;

/// Register metric descriptions. Call once at startup, after a recorder is
/// installed.
pub fn describe_metrics() {
    describe_counter!("lock_acquire_total", "Lock acquisitions by result");
    describe_counter!("lock_release_total", "Lock releases by outcome");
    describe_counter!("lock_extend_total", "Lock extensions by result");
    describe_counter!(
        "lock_node_votes_total",
        "Storage node votes by operation and vote"
    );
    describe_gauge!("lock_active", "Locks currently held by this process");
    describe_histogram!(
        "lock_acquire_duration_seconds",
        "Time spent acquiring a lock, retries included"
    );
}

pub fn record_votes(op: NodeOp, votes: &Votes) {
    counter!("lock_node_votes_total", "op" => op.as_str(), "vote" => "yes")
        .increment(votes.yes as u64);
    counter!("lock_node_votes_total", "op" => op.as_str(), "vote" => "no")
        .increment(votes.no as u64);
    counter!("lock_node_votes_total", "op" => op.as_str(), "vote" => "unavailable")
        .increment(votes.unavailable as u64);
}

pub fn record_acquire(result: &'static str, duration: Duration) {
    counter!("lock_acquire_total", "result" => result).increment(1);
    histogram!("lock_acquire_duration_seconds").record(duration.as_secs_f64());
}

pub fn record_release(outcome: &'static str) {
    counter!("lock_release_total", "result" => outcome).increment(1);
}

pub fn record_extend(result: &'static str) {
    counter!("lock_extend_total", "result" => result).increment(1);
}

pub fn lock_activated() {
    gauge!("lock_active").increment(1.0);
}

pub fn lock_deactivated() {
    gauge!("lock_active").decrement(1.0);
}
