//! Prometheus-compatible metrics for the engine and the HTTP layer.

use crate::models::{OrderType, Side};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Metric names as constants for consistency
pub mod names {
    pub const ORDERS_SUBMITTED_TOTAL: &str = "orders_submitted_total";
    pub const ORDERS_CANCELLED_TOTAL: &str = "orders_cancelled_total";
    pub const ORDER_MATCH_DURATION_SECONDS: &str = "order_match_duration_seconds";
    pub const TRADES_EXECUTED_TOTAL: &str = "trades_executed_total";
    pub const TRADE_VOLUME_QUOTE: &str = "trade_volume_quote";
    pub const ORDER_BOOK_DEPTH: &str = "order_book_depth";
}

/// Label keys
pub mod labels {
    pub const ORDER_SIDE: &str = "side";
    pub const ORDER_TYPE: &str = "order_type";
    pub const INSTRUMENT: &str = "instrument";
}

/// Initialize the Prometheus exporter and return a handle for rendering.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        // Matching should be fast; bucket accordingly.
        .set_buckets_for_metric(
            Matcher::Full(names::ORDER_MATCH_DURATION_SECONDS.to_string()),
            &[0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.5],
        )
        .expect("histogram buckets must not be empty")
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record order submission
pub fn record_order_submitted(side: Side, order_type: OrderType) {
    counter!(
        names::ORDERS_SUBMITTED_TOTAL,
        labels::ORDER_SIDE => side.to_string(),
        labels::ORDER_TYPE => order_type.to_string()
    )
    .increment(1);
}

/// Record order cancellation
pub fn record_order_cancelled() {
    counter!(names::ORDERS_CANCELLED_TOTAL).increment(1);
}

/// Record one matching pass duration
pub fn record_order_match_duration(duration_secs: f64) {
    histogram!(names::ORDER_MATCH_DURATION_SECONDS).record(duration_secs);
}

/// Record the trades of one matching pass and their quote volume
pub fn record_trades_executed(count: usize, quote_volume: f64) {
    counter!(names::TRADES_EXECUTED_TOTAL).increment(count as u64);
    counter!(names::TRADE_VOLUME_QUOTE).increment(quote_volume as u64);
}

/// Track resting order count per instrument
pub fn set_order_book_depth(instrument: &str, resting: usize) {
    gauge!(
        names::ORDER_BOOK_DEPTH,
        labels::INSTRUMENT => instrument.to_string()
    )
    .set(resting as f64);
}
