use alpha_vantage_client::{AlphaVantageClient, AlphaVantageConfig};
use anyhow::Context;
use axum::{
    extract::{Request, State},
    middleware,
    routing::get,
    Json, Router,
};
use market_aggregator::{Aggregator, FingerprintCache};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod demo;
pub mod error;
pub mod fetch_routes;
pub mod request_id;

pub use config::ServerConfig;
pub use error::AppError;

use fetch_routes::fetch_routes;
use request_id::request_id_middleware;

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
}

impl AppState {
    pub fn from_config(config: &ServerConfig) -> Self {
        let client = AlphaVantageClient::new(AlphaVantageConfig {
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            timeout: config.upstream_timeout,
        });
        let cache = Arc::new(FingerprintCache::with_capacity(
            config.cache_ttl,
            config.cache_max_entries,
        ));
        let aggregator = Aggregator::new(Arc::new(client), cache)
            .with_interval(config.intraday_interval.clone())
            .with_policy(config.policy);

        Self {
            aggregator: Arc::new(aggregator),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(fetch_routes())
        .route("/health", get(health))
        .with_state(state)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .layer(CorsLayer::permissive())
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "cache_entries": state.aggregator.cache().len(),
    }))
}

/// Text logs by default; `RUST_LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "api_server=info,market_aggregator=info,alpha_vantage_client=info,tower_http=info".into()
    });

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

/// Periodically drop expired entries so idle keys do not pile up between
/// inserts.
fn spawn_cache_sweeper(cache: Arc<FingerprintCache>, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period.max(Duration::from_secs(1)));
        interval.tick().await;
        loop {
            interval.tick().await;
            let purged = cache.purge_expired();
            if purged > 0 {
                tracing::debug!("Swept {} expired cache entries", purged);
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ServerConfig::from_env()?;
    if config.api_key.is_none() {
        tracing::warn!(
            "ALPHA_VANTAGE_API_KEY not set; upstream calls will fail with authentication errors"
        );
    }

    let state = AppState::from_config(&config);
    spawn_cache_sweeper(state.aggregator.cache().clone(), config.cache_ttl);
    tracing::info!(
        "Cache TTL {}s, capacity {}, upstream timeout {}s, policy {:?}",
        config.cache_ttl.as_secs(),
        config.cache_max_entries,
        config.upstream_timeout.as_secs(),
        config.policy
    );

    let addr = config.listen_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Market data aggregator listening on {}", addr);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}
