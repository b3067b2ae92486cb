use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::{LazyLock, Once};

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Terminal decisions, labelled forward / redirect_login / redirect_pricing / redirect_error
pub static DECISIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("gateway_decisions_total", "Gateway decisions by outcome"),
        &["decision"],
    )
    .unwrap()
});

// Verification
pub static VERIFICATION_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "gateway_verification_failures_total",
            "Entitlement checks that did not return a usable result",
        ),
        &["reason"],
    )
    .unwrap()
});

pub static VERIFICATION_LATENCY: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "gateway_verification_latency_seconds",
            "Entitlement check latency",
        )
        .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
    )
    .unwrap()
});

// Forwarding
pub static FORWARD_LATENCY: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("gateway_forward_latency_seconds", "Origin round-trip latency")
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
    )
    .unwrap()
});

pub static FORWARD_ERRORS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gateway_forward_errors_total",
        "Requests that could not be forwarded to the origin",
    )
    .unwrap()
});

static REGISTER: Once = Once::new();

/// Register all metrics with the registry. Safe to call more than once.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(DECISIONS_TOTAL.clone()),
            Box::new(VERIFICATION_FAILURES.clone()),
            Box::new(VERIFICATION_LATENCY.clone()),
            Box::new(FORWARD_LATENCY.clone()),
            Box::new(FORWARD_ERRORS.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                tracing::warn!(error = %e, "failed to register metric");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        register_metrics();
        register_metrics();
        DECISIONS_TOTAL.with_label_values(&["forward"]).inc();

        use prometheus::Encoder;
        let mut buffer = Vec::new();
        prometheus::TextEncoder::new()
            .encode(&REGISTRY.gather(), &mut buffer)
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("gateway_decisions_total"));
    }
}
