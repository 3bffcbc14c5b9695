use axum::{
    extract::rejection::QueryRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use market_core::AggregationError;
use serde_json::json;
use thiserror::Error;

pub const MISSING_TICKER: &str = "Missing \"ticker\" query parameter.";
pub const UPSTREAM_FAILURE: &str = "Failed to fetch data from Alpha Vantage.";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),
}

impl AppError {
    pub fn missing_ticker() -> Self {
        AppError::Validation(MISSING_TICKER.to_string())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Validation(message) => (StatusCode::BAD_REQUEST, message.as_str()),
            AppError::Aggregation(e) => {
                // Detail stays in the log; the client only gets a generic message.
                tracing::error!(
                    ticker = %e.ticker,
                    operation = %e.operation,
                    status = ?e.source.status(),
                    "Aggregation failed: {}",
                    e
                );
                (StatusCode::INTERNAL_SERVER_ERROR, UPSTREAM_FAILURE)
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
