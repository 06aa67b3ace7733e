//! Prometheus metrics for key recovery batches.
//!
//! All metrics follow the naming convention: `kr_<metric>_<unit>`

use kr_01_key_recovery::BatchReport;
use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts,
    Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Signature pairs processed, by outcome
    pub static ref PAIRS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("kr_pairs_total", "Signature pairs processed"),
        &["outcome"]  // already_attempted/published_key/reconciled/recovered/not_found/failed
    ).expect("metric creation failed");

    /// Keys recovered and persisted
    pub static ref KEYS_RECOVERED: IntCounter = IntCounter::new(
        "kr_keys_recovered_total",
        "Total keys recovered by GCD and persisted"
    ).expect("metric creation failed");

    /// Key period windows widened during reconciliation
    pub static ref KEY_PERIODS_EXTENDED: IntCounter = IntCounter::new(
        "kr_key_periods_extended_total",
        "Total key period windows extended by reconciliation"
    ).expect("metric creation failed");

    /// Domain/selector groups seen by the batch driver
    pub static ref GROUPS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("kr_groups_total", "Domain/selector groups seen by the batch driver"),
        &["status"]  // processed/skipped
    ).expect("metric creation failed");

    /// Wall time of one solver call
    pub static ref GCD_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "kr_gcd_duration_seconds",
            "Time spent recovering a modulus from one signature pair"
        ).buckets(exponential_buckets(0.01, 2.0, 14).expect("valid buckets"))
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry. Safe to call repeatedly.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(PAIRS_TOTAL.clone()),
        Box::new(KEYS_RECOVERED.clone()),
        Box::new(KEY_PERIODS_EXTENDED.clone()),
        Box::new(GROUPS_TOTAL.clone()),
        Box::new(GCD_DURATION.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Fold a finished batch into the counters.
pub fn record_batch(report: &BatchReport) {
    for group in &report.groups {
        GROUPS_TOTAL.with_label_values(&["processed"]).inc();
        KEY_PERIODS_EXTENDED.inc_by(group.extended_periods as u64);
        for (_, outcome) in &group.pairs {
            PAIRS_TOTAL.with_label_values(&[outcome.label()]).inc();
        }
        for duration in &group.solve_durations {
            GCD_DURATION.observe(duration.as_secs_f64());
        }
    }
    GROUPS_TOTAL
        .with_label_values(&["skipped"])
        .inc_by(report.skipped_groups as u64);
    KEYS_RECOVERED.inc_by(report.keys_recovered() as u64);
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
