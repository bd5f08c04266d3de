// Metrics for lock operations
// Emitted through the `metrics` facade; no exporter is installed here

use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};

pub const ACQUIRE_TOTAL: &str = "redlease_acquire_total";
pub const ACQUIRE_ROUND_TRIP: &str = "redlease_acquire_round_trip_seconds";
pub const RELEASE_TOTAL: &str = "redlease_release_total";
pub const RELEASE_ABANDONED_TOTAL: &str = "redlease_release_abandoned_total";

/// Outcome label of an acquire or release call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Acquired,
    Contended,
    Released,
    NotOwner,
    Unexpected,
    Error,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Acquired => "acquired",
            Outcome::Contended => "contended",
            Outcome::Released => "released",
            Outcome::NotOwner => "not_owner",
            Outcome::Unexpected => "unexpected",
            Outcome::Error => "error",
        }
    }
}

/// Register metric descriptions with the installed recorder
pub fn describe_metrics() {
    describe_counter!(ACQUIRE_TOTAL, "Lock acquire calls by outcome");
    describe_histogram!(
        ACQUIRE_ROUND_TRIP,
        "Store round trip of successful lock acquisitions in seconds"
    );
    describe_counter!(RELEASE_TOTAL, "Lock release calls by outcome");
    describe_counter!(
        RELEASE_ABANDONED_TOTAL,
        "Runner release loops that gave up before confirming the release"
    );
}

pub fn record_acquire(name: &str, outcome: Outcome, round_trip: Duration) {
    counter!(ACQUIRE_TOTAL, "lock" => name.to_string(), "outcome" => outcome.as_str()).increment(1);
    if outcome == Outcome::Acquired {
        histogram!(ACQUIRE_ROUND_TRIP, "lock" => name.to_string()).record(round_trip.as_secs_f64());
    }
}

pub fn record_release(name: &str, outcome: Outcome) {
    counter!(RELEASE_TOTAL, "lock" => name.to_string(), "outcome" => outcome.as_str()).increment(1);
}

pub fn record_release_abandoned(name: &str) {
    counter!(RELEASE_ABANDONED_TOTAL, "lock" => name.to_string()).increment(1);
}
