use std::time::Duration;

use thiserror::Error;

use crate::Operation;

/// Failure of a single call to the market-data provider.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The provider answered 200 but the body only carries an error,
    /// quota note or informational message.
    #[error("Request rejected by provider: {message}")]
    Rejected { message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid response body: {0}")]
    InvalidBody(String),
}

impl UpstreamError {
    /// HTTP status reported by the provider, if the call got that far.
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            UpstreamError::Rejected { .. } | UpstreamError::InvalidBody(_) => Some(200),
            UpstreamError::Transport(_) | UpstreamError::Timeout(_) => None,
        }
    }
}

/// Failure of a combined request: carries the first constituent failure.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{operation} fetch failed for {ticker}: {source}")]
pub struct AggregationError {
    pub ticker: String,
    pub operation: Operation,
    #[source]
    pub source: UpstreamError,
}

impl AggregationError {
    pub fn new(ticker: impl Into<String>, operation: Operation, source: UpstreamError) -> Self {
        Self {
            ticker: ticker.into(),
            operation,
            source,
        }
    }
}
