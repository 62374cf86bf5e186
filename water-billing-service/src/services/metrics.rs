//! Metrics module for water-billing-service.
//! HTTP metrics go through the `metrics` facade; billing metrics are Prometheus
//! collectors in the default registry. `/metrics` renders both.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_counter_vec, register_histogram_vec, register_int_counter,
    register_int_counter_vec, CounterVec, Encoder, HistogramVec, IntCounter, IntCounterVec,
    TextEncoder,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::OnceLock;

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "water_billing_db_query_duration_seconds",
            "Database query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Generation runs by outcome
pub static GENERATION_RUNS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

pub static BILLS_GENERATED_TOTAL: OnceLock<IntCounter> = OnceLock::new();

/// Payments by type and resulting bill status
pub static PAYMENTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Amount collected by payment type
pub static PAYMENT_AMOUNT_TOTAL: OnceLock<CounterVec> = OnceLock::new();

pub static PAYMENT_REVERSALS_TOTAL: OnceLock<IntCounter> = OnceLock::new();

/// Bill notices by outcome
pub static NOTIFICATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Error counter for alerting
pub static ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Later calls are no-ops.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_some() {
        return;
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");
    if METRICS_HANDLE.set(handle).is_err() {
        panic!("failed to set metrics handle: already initialized");
    }

    GENERATION_RUNS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "water_billing_generation_runs_total",
                "Total bill generation runs by status"
            ),
            &["status"]
        )
        .expect("Failed to register GENERATION_RUNS_TOTAL")
    });

    BILLS_GENERATED_TOTAL.get_or_init(|| {
        register_int_counter!(opts!(
            "water_billing_bills_generated_total",
            "Total bills generated"
        ))
        .expect("Failed to register BILLS_GENERATED_TOTAL")
    });

    PAYMENTS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "water_billing_payments_total",
                "Total payments by type and resulting bill status"
            ),
            &["payment_type", "status"]
        )
        .expect("Failed to register PAYMENTS_TOTAL")
    });

    PAYMENT_AMOUNT_TOTAL.get_or_init(|| {
        register_counter_vec!(
            opts!(
                "water_billing_payment_amount_total",
                "Total amount collected by payment type"
            ),
            &["payment_type"]
        )
        .expect("Failed to register PAYMENT_AMOUNT_TOTAL")
    });

    PAYMENT_REVERSALS_TOTAL.get_or_init(|| {
        register_int_counter!(opts!(
            "water_billing_payment_reversals_total",
            "Total payments reversed"
        ))
        .expect("Failed to register PAYMENT_REVERSALS_TOTAL")
    });

    NOTIFICATIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "water_billing_notifications_total",
                "Total bill notices by outcome"
            ),
            &["outcome"]
        )
        .expect("Failed to register NOTIFICATIONS_TOTAL")
    });

    ERRORS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("water_billing_errors_total", "Total errors by type for alerting"),
            &["error_type", "operation"]
        )
        .expect("Failed to register ERRORS_TOTAL")
    });

    // Force initialization of lazy statics
    let _ = &*DB_QUERY_DURATION;
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string());

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer).ok();
    if let Ok(billing_metrics) = String::from_utf8(buffer) {
        output.push_str(&billing_metrics);
    }

    output
}

pub fn record_generation_run(status: &str) {
    if let Some(counter) = GENERATION_RUNS_TOTAL.get() {
        counter.with_label_values(&[status]).inc();
    }
}

pub fn record_bills_generated(count: u64) {
    if let Some(counter) = BILLS_GENERATED_TOTAL.get() {
        counter.inc_by(count);
    }
}

/// Record a payment and the amount collected.
pub fn record_payment(payment_type: &str, status: &str, amount: Decimal) {
    if let Some(counter) = PAYMENTS_TOTAL.get() {
        counter.with_label_values(&[payment_type, status]).inc();
    }
    if let Some(counter) = PAYMENT_AMOUNT_TOTAL.get() {
        let amount = amount.to_f64().unwrap_or(0.0);
        counter
            .with_label_values(&[payment_type])
            .inc_by(amount.abs());
    }
}

pub fn record_payment_reversal() {
    if let Some(counter) = PAYMENT_REVERSALS_TOTAL.get() {
        counter.inc();
    }
}

pub fn record_notification(outcome: &str) {
    if let Some(counter) = NOTIFICATIONS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

/// Record an error for alerting.
pub fn record_error(error_type: &str, operation: &str) {
    if let Some(counter) = ERRORS_TOTAL.get() {
        counter.with_label_values(&[error_type, operation]).inc();
    }
}
