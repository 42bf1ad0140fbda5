//! API handlers mapping HTTP requests onto the engine.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::api::AppState;
use crate::engine::OrderBookSnapshot;
use crate::models::{AccountResponse, Instrument, OrderResponse, OrderType, Side};
use crate::utils::response::{ApiResponse, AppError};

fn parse_pair(pair: &str) -> Result<Instrument, AppError> {
    pair.parse()
        .map_err(|_| AppError::bad_request(&format!("invalid pair: {pair} (expected base_quote)")))
}

// ============================================================================
// Pair administration
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreatePairRequest {
    pub pair: String,
}

/// POST /pairs
pub async fn create_pair(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePairRequest>,
) -> Result<Json<ApiResponse<String>>, AppError> {
    let instrument = parse_pair(&req.pair)?;
    state.exchange.create_pair(instrument.clone())?;
    Ok(Json(ApiResponse::success(instrument.to_string())))
}

/// DELETE /pairs/:pair
pub async fn delete_pair(
    State(state): State<Arc<AppState>>,
    Path(pair): Path<String>,
) -> Result<Json<ApiResponse<String>>, AppError> {
    let instrument = parse_pair(&pair)?;
    state.exchange.delete_pair(&instrument)?;
    Ok(Json(ApiResponse::success(instrument.to_string())))
}

/// GET /pairs
pub async fn list_pairs(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<Vec<String>>> {
    let mut pairs: Vec<String> = state
        .exchange
        .pairs()
        .iter()
        .map(|pair| pair.to_string())
        .collect();
    pairs.sort();
    Json(ApiResponse::success(pairs))
}

// ============================================================================
// Account administration
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub name: String,
    #[serde(default)]
    pub balances: HashMap<String, Decimal>,
}

/// POST /accounts
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateAccountRequest>,
) -> Result<Json<ApiResponse<AccountResponse>>, AppError> {
    let account = state.exchange.create_account(&req.name, req.balances)?;
    Ok(Json(ApiResponse::success(account.snapshot().await)))
}

/// DELETE /accounts/:name
pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<String>>, AppError> {
    state.exchange.delete_account(&name).await?;
    Ok(Json(ApiResponse::success(name)))
}

#[derive(Debug, Deserialize)]
pub struct RefillRequest {
    pub balances: HashMap<String, Decimal>,
}

/// POST /accounts/:name/refill
pub async fn refill_account(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<RefillRequest>,
) -> Result<Json<ApiResponse<AccountResponse>>, AppError> {
    state.exchange.refill_account(&name, req.balances).await?;
    let account = state.exchange.get_account(&name)?;
    Ok(Json(ApiResponse::success(account.snapshot().await)))
}

/// GET /accounts/:name
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<AccountResponse>>, AppError> {
    let account = state.exchange.get_account(&name)?;
    Ok(Json(ApiResponse::success(account.snapshot().await)))
}

/// GET /accounts/:name/balances
pub async fn get_account_balances(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<HashMap<String, Decimal>>>, AppError> {
    let account = state.exchange.get_account(&name)?;
    Ok(Json(ApiResponse::success(account.snapshot().await.balances)))
}

/// GET /accounts
pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<Vec<AccountResponse>>> {
    let mut accounts = state.exchange.account_snapshots().await;
    accounts.sort_by(|a, b| a.name.cmp(&b.name));
    Json(ApiResponse::success(accounts))
}

// ============================================================================
// Trading
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub pair: String,
    pub account: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub amount: Decimal,
    pub price: Option<Decimal>,
}

/// POST /orders
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, AppError> {
    let instrument = parse_pair(&req.pair)?;

    let order = match req.order_type {
        OrderType::Limit => {
            let price = req
                .price
                .ok_or_else(|| AppError::bad_request("limit orders require a price"))?;
            state
                .exchange
                .create_limit(instrument, price, req.side, req.amount, &req.account)
                .await?
        }
        OrderType::Market => {
            state
                .exchange
                .create_market(instrument, req.side, req.amount, &req.account)
                .await?
        }
    };

    Ok(Json(ApiResponse::success(OrderResponse::from(&*order))))
}

/// GET /orders/:order_id
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<u64>,
) -> Result<Json<ApiResponse<OrderResponse>>, AppError> {
    let order = state.exchange.get_order(order_id)?;
    Ok(Json(ApiResponse::success(OrderResponse::from(&*order))))
}

#[derive(Debug, Deserialize)]
pub struct CancelOrderQuery {
    pub pair: String,
}

/// DELETE /orders/:order_id?pair=base_quote
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<u64>,
    Query(query): Query<CancelOrderQuery>,
) -> Result<Json<ApiResponse<u64>>, AppError> {
    let instrument = parse_pair(&query.pair)?;
    state.exchange.cancel_order(&instrument, order_id).await?;
    Ok(Json(ApiResponse::success(order_id)))
}

#[derive(Debug, Deserialize)]
pub struct OrderBookQuery {
    pub levels: Option<usize>,
}

/// GET /markets/:pair/orderbook
pub async fn get_order_book(
    State(state): State<Arc<AppState>>,
    Path(pair): Path<String>,
    Query(query): Query<OrderBookQuery>,
) -> Result<Json<ApiResponse<OrderBookSnapshot>>, AppError> {
    let instrument = parse_pair(&pair)?;
    let levels = query.levels.unwrap_or(50).clamp(1, 500);
    let snapshot = state.exchange.order_book_snapshot(&instrument, levels).await?;
    Ok(Json(ApiResponse::success(snapshot)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes;
    use crate::engine::Exchange;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use rust_decimal_macros::dec;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        let exchange = Arc::new(Exchange::new());
        exchange.create_pair(Instrument::new("btc", "usdt")).unwrap();
        exchange
            .create_account(
                "alice",
                HashMap::from([
                    ("btc".to_string(), dec!(1000)),
                    ("usdt".to_string(), dec!(1000)),
                ]),
            )
            .unwrap();
        let state = Arc::new(AppState {
            exchange,
            // A handle that renders without installing the global recorder.
            metrics: PrometheusBuilder::new().build_recorder().handle(),
        });
        routes::create_router().with_state(state)
    }

    async fn response_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_order_returns_projection() {
        let app = app();
        let request = post(
            "/orders",
            json!({
                "pair": "btc_usdt",
                "account": "alice",
                "side": "buy",
                "type": "limit",
                "amount": "10",
                "price": "0.5",
            }),
        );

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response_json(response).await;
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["data"]["instrument"], json!("btc/usdt"));
        assert_eq!(body["data"]["status"], json!("opened"));
        assert_eq!(body["data"]["type"], json!("limit"));
    }

    #[tokio::test]
    async fn test_unknown_account_maps_to_not_found() {
        let app = app();
        let request = post(
            "/orders",
            json!({
                "pair": "btc_usdt",
                "account": "nobody",
                "side": "sell",
                "type": "market",
                "amount": "1",
            }),
        );

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = response_json(response).await;
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"]["code"], json!("UNKNOWN_ACCOUNT"));
    }

    #[tokio::test]
    async fn test_account_balances_projection() {
        let app = app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/accounts/alice/balances")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response_json(response).await;
        assert_eq!(body["data"]["btc"], json!("1000"));
        assert_eq!(body["data"]["usdt"], json!("1000"));
    }

    #[tokio::test]
    async fn test_orderbook_snapshot_roundtrip() {
        let app = app();
        let create = post(
            "/orders",
            json!({
                "pair": "btc_usdt",
                "account": "alice",
                "side": "sell",
                "type": "limit",
                "amount": "4",
                "price": "2",
            }),
        );
        app.clone().oneshot(create).await.unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/markets/btc_usdt/orderbook")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response_json(response).await;
        assert_eq!(body["data"]["pair"], json!("btc/usdt"));
        assert_eq!(body["data"]["asks"], json!([["2", "4"]]));
        assert_eq!(body["data"]["bids"], json!([]));
    }
}
