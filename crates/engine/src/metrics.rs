use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref STEP_EXECUTIONS_TOTAL: IntCounter = IntCounter::new(
        "easytrain_step_executions_total",
        "Total number of step executions started."
    )
    .unwrap();
    pub static ref STEP_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "easytrain_step_failures_total",
        "Total number of step executions that ended in error."
    )
    .unwrap();
    pub static ref STEP_CANCELLATIONS_TOTAL: IntCounter = IntCounter::new(
        "easytrain_step_cancellations_total",
        "Total number of step executions cancelled by the operator."
    )
    .unwrap();
    pub static ref LOG_ENTRIES_TOTAL: IntCounter = IntCounter::new(
        "easytrain_log_entries_total",
        "Total number of log entries ingested."
    )
    .unwrap();
}

pub fn register_metrics() {
    REGISTRY
        .register(Box::new(STEP_EXECUTIONS_TOTAL.clone()))
        .expect("failed to register STEP_EXECUTIONS_TOTAL");
    REGISTRY
        .register(Box::new(STEP_FAILURES_TOTAL.clone()))
        .expect("failed to register STEP_FAILURES_TOTAL");
    REGISTRY
        .register(Box::new(STEP_CANCELLATIONS_TOTAL.clone()))
        .expect("failed to register STEP_CANCELLATIONS_TOTAL");
    REGISTRY
        .register(Box::new(LOG_ENTRIES_TOTAL.clone()))
        .expect("failed to register LOG_ENTRIES_TOTAL");
}

pub fn gather_metrics() -> String {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("failed to encode metrics");
    String::from_utf8(buffer).expect("failed to convert metrics to string")
}
