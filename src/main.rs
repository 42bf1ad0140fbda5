use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::{routing::get, Router};
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spot_exchange::api::{routes, AppState};
use spot_exchange::{AppConfig, Exchange};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spot_exchange=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = AppConfig::load()?;

    tracing::info!("Starting spot exchange v{}", env!("CARGO_PKG_VERSION"));

    // Install the Prometheus recorder before the engine emits anything
    let metrics_handle = spot_exchange::metrics::init_metrics();

    // Build the engine and seed the configured trading pairs
    let exchange = Arc::new(Exchange::with_settings(
        config.fee_schedule(),
        config.event_capacity,
    ));
    let trading_pairs = config.get_trading_pairs()?;
    for pair in &trading_pairs {
        exchange.create_pair(pair.clone())?;
    }
    tracing::info!("Matching engine initialized for {:?}", config.trading_pairs);

    // Event log worker: drains the engine event stream into the log
    let mut event_receiver = exchange.events().subscribe();
    tokio::spawn(async move {
        loop {
            match event_receiver.recv().await {
                Ok(event) => tracing::debug!(?event, "engine event delivered"),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("event log worker lagged {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Build application state
    let state = Arc::new(AppState {
        exchange,
        metrics: metrics_handle,
    });

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        .nest("/api/v1", routes::create_router())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn render_metrics(State(state): State<Arc<AppState>>) -> String {
    state.metrics.render()
}
