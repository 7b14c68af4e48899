//! OpenTelemetry metrics for provisioning attempts
//!
//! Instruments are created lazily on the global meter, so recording before
//! (or without) [`crate::telemetry::init_telemetry`] installing an OTLP
//! exporter is a no-op.

use std::time::Instant;

use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;

use crate::Error;

static METER: Lazy<Meter> = Lazy::new(|| global::meter("remotecluster"));

/// Counter of provisioning attempts
///
/// Labels:
/// - `result`: success, failure
pub static PROVISIONING_ATTEMPTS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("remotecluster_provisioning_attempts_total")
        .with_description("Total number of provisioning attempts")
        .with_unit("{attempts}")
        .build()
});

/// Counter of failed provisioning attempts
///
/// Labels:
/// - `error_kind`: see [`Error::kind`]
pub static PROVISIONING_FAILURES: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("remotecluster_provisioning_failures_total")
        .with_description("Total number of failed provisioning attempts by error kind")
        .with_unit("{failures}")
        .build()
});

/// Histogram of provisioning attempt duration
///
/// Labels:
/// - `result`: success, failure
pub static PROVISIONING_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("remotecluster_provisioning_duration_seconds")
        .with_description("Duration of provisioning attempts in seconds")
        .with_unit("s")
        .build()
});

/// Outcome label for an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptResult {
    /// The bootstrap sequence completed
    Success,
    /// The attempt ended in the Failed phase
    Failure,
}

impl AttemptResult {
    /// Convert to label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// Times one provisioning attempt and records it on completion
pub struct ProvisioningTimer {
    start: Instant,
}

impl ProvisioningTimer {
    /// Start timing an attempt
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Record a completed attempt
    pub fn success(self) {
        self.finish(AttemptResult::Success);
    }

    /// Record a failed attempt, labelled with the kind of error
    pub fn failure(self, error: &Error) {
        PROVISIONING_FAILURES.add(1, &[KeyValue::new("error_kind", error.kind())]);
        self.finish(AttemptResult::Failure);
    }

    fn finish(self, result: AttemptResult) {
        let labels = [KeyValue::new("result", result.as_str())];
        PROVISIONING_ATTEMPTS.add(1, &labels);
        PROVISIONING_DURATION.record(self.start.elapsed().as_secs_f64(), &labels);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_labels_are_lowercase() {
        assert_eq!(AttemptResult::Success.as_str(), "success");
        assert_eq!(AttemptResult::Failure.as_str(), "failure");
    }

    #[test]
    fn recording_without_exporter_is_a_noop() {
        ProvisioningTimer::start().success();
        ProvisioningTimer::start().failure(&Error::connection("10.0.0.5:22", "refused"));
    }
}
