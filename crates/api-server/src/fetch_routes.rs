//! Market Data API Routes
//!
//! `GET /fetch` joins live intraday, daily and news data for a ticker.
//! `GET /fetch/demo` serves a fixture with the same shape.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use market_core::AggregateResult;
use serde::Deserialize;

use crate::demo::demo_record;
use crate::{AppError, AppState};

#[derive(Deserialize)]
pub struct TickerQuery {
    #[serde(default)]
    pub ticker: Option<String>,
}

impl TickerQuery {
    /// Trimmed, uppercased ticker, or a validation error when absent.
    fn normalized(&self) -> Result<String, AppError> {
        self.ticker
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_uppercase)
            .ok_or_else(AppError::missing_ticker)
    }
}

pub fn fetch_routes() -> Router<AppState> {
    Router::new()
        .route("/fetch", get(fetch_market_data))
        .route("/fetch/demo", get(fetch_demo_data))
}

async fn fetch_market_data(
    State(state): State<AppState>,
    query: Result<Query<TickerQuery>, QueryRejection>,
) -> Result<Json<AggregateResult>, AppError> {
    let Query(query) = query?;
    let ticker = query.normalized()?;
    let record = state.aggregator.aggregate(&ticker).await?;
    Ok(Json(record))
}

async fn fetch_demo_data(
    query: Result<Query<TickerQuery>, QueryRejection>,
) -> Result<Json<AggregateResult>, AppError> {
    let Query(query) = query?;
    let ticker = query.normalized()?;
    tracing::info!("Serving demo record for {}", ticker);
    Ok(Json(demo_record(&ticker, Utc::now())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_router;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use market_aggregator::{Aggregator, FingerprintCache};
    use market_core::{MarketDataSource, Operation, UpstreamError, UpstreamRequest};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tower::ServiceExt;

    #[derive(Default)]
    struct StubSource {
        calls: AtomicUsize,
        symbols: Mutex<Vec<String>>,
        failing: Option<Operation>,
    }

    #[async_trait]
    impl MarketDataSource for StubSource {
        async fn fetch(&self, request: &UpstreamRequest) -> Result<Value, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(symbol) = request.params.get("symbol") {
                self.symbols.lock().unwrap().push(symbol.clone());
            }
            if self.failing == Some(request.operation) {
                return Err(UpstreamError::Status {
                    status: 401,
                    body: "apikey=secret is invalid".to_string(),
                });
            }
            Ok(json!({ "marker": format!("payload-{}", request.operation) }))
        }
    }

    fn app(source: Arc<StubSource>) -> Router {
        let cache = Arc::new(FingerprintCache::new(Duration::from_secs(300)));
        let state = AppState {
            aggregator: Arc::new(Aggregator::new(source, cache)),
        };
        build_router(state)
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn sorted_keys(value: &Value) -> Vec<String> {
        let mut keys: Vec<String> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    #[tokio::test]
    async fn test_missing_ticker_is_client_error_without_upstream_calls() {
        let source = Arc::new(StubSource::default());

        for uri in ["/fetch", "/fetch?ticker=", "/fetch?ticker=%20%20"] {
            let (status, body) = get(app(source.clone()), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert_eq!(body, json!({ "error": "Missing \"ticker\" query parameter." }));
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_query_is_json_client_error() {
        let source = Arc::new(StubSource::default());

        for uri in ["/fetch?ticker=a&ticker=b", "/fetch/demo?ticker=a&ticker=b"] {
            let (status, body) = get(app(source.clone()), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert!(body["error"].as_str().is_some_and(|m| !m.is_empty()), "{}", body);
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_returns_combined_record() {
        let source = Arc::new(StubSource::default());
        let (status, body) = get(app(source.clone()), "/fetch?ticker=aapl").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(sorted_keys(&body), vec!["daily", "intraday", "news", "ticker"]);
        assert_eq!(body["ticker"], "AAPL");
        assert_eq!(body["daily"]["marker"], "payload-TIME_SERIES_DAILY");
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert!(source.symbols.lock().unwrap().iter().all(|s| s == "AAPL"));
    }

    #[tokio::test]
    async fn test_one_upstream_failure_is_generic_server_error() {
        let source = Arc::new(StubSource {
            failing: Some(Operation::TimeSeriesIntraday),
            ..Default::default()
        });
        let (status, body) = get(app(source), "/fetch?ticker=AAPL").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Failed to fetch data from Alpha Vantage." }));
        let text = body.to_string();
        assert!(!text.contains("payload-"));
        assert!(!text.contains("secret"));
    }

    #[tokio::test]
    async fn test_demo_mirrors_live_shape() {
        let source = Arc::new(StubSource::default());
        let (status, body) = get(app(source.clone()), "/fetch/demo?ticker=goog").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(sorted_keys(&body), vec!["daily", "intraday", "news", "ticker"]);
        assert_eq!(body["ticker"], "GOOG");
        assert_eq!(body["daily"]["Meta Data"]["2. Symbol"], "GOOG");
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_demo_requires_ticker() {
        let (status, body) = get(app(Arc::new(StubSource::default())), "/fetch/demo").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing \"ticker\" query parameter.");
    }

    #[tokio::test]
    async fn test_request_id_is_echoed_or_generated() {
        let app = app(Arc::new(StubSource::default()));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/fetch/demo?ticker=IBM")
                    .header("x-request-id", "req-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["x-request-id"], "req-123");

        let response = app
            .oneshot(Request::builder().uri("/fetch/demo?ticker=IBM").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let generated = response.headers()["x-request-id"].to_str().unwrap();
        assert_eq!(generated.len(), 36);
    }

    #[tokio::test]
    async fn test_health_reports_cache_size() {
        let source = Arc::new(StubSource::default());
        let app = app(source);

        let (_, _) = get(app.clone(), "/fetch?ticker=IBM").await;
        let (status, body) = get(app, "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok", "cache_entries": 3 }));
    }
}
