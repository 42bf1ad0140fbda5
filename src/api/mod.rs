//! HTTP front-end: a thin mapping from requests to engine calls. All trading
//! and settlement logic lives in the engine.

pub mod handlers;
pub mod routes;

use crate::engine::Exchange;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

pub struct AppState {
    pub exchange: Arc<Exchange>,
    pub metrics: PrometheusHandle,
}
