use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use crate::api::{handlers, AppState};

pub fn create_router() -> Router<Arc<AppState>> {
    // Admin routes
    let admin_routes = Router::new()
        .route("/pairs", post(handlers::create_pair))
        .route("/pairs", get(handlers::list_pairs))
        .route("/pairs/:pair", delete(handlers::delete_pair))
        .route("/accounts", post(handlers::create_account))
        .route("/accounts", get(handlers::list_accounts))
        .route("/accounts/:name", get(handlers::get_account))
        .route("/accounts/:name", delete(handlers::delete_account))
        .route("/accounts/:name/balances", get(handlers::get_account_balances))
        .route("/accounts/:name/refill", post(handlers::refill_account));

    // Trading routes
    let trading_routes = Router::new()
        .route("/orders", post(handlers::create_order))
        .route("/orders/:order_id", get(handlers::get_order))
        .route("/orders/:order_id", delete(handlers::cancel_order))
        .route("/markets/:pair/orderbook", get(handlers::get_order_book));

    Router::new().merge(admin_routes).merge(trading_routes)
}
