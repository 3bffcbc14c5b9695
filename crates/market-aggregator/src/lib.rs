use market_core::{
    AggregateResult, AggregationError, MarketDataSource, Operation, UpstreamError,
    UpstreamRequest,
};
use serde_json::Value;
use std::sync::Arc;

pub mod cache;
pub use cache::{FingerprintCache, DEFAULT_MAX_ENTRIES, DEFAULT_TTL_SECS};

pub const DEFAULT_INTRADAY_INTERVAL: &str = "5min";

/// What to do when some, but not all, constituent fetches fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregationPolicy {
    /// Any failure fails the whole record.
    #[default]
    AllOrNothing,
    /// Failed fields become `null` and are listed in `unavailable`.
    /// Still an error when nothing could be fetched.
    Partial,
}

/// Joins intraday, daily and news payloads for a ticker.
///
/// Each payload is cached on its own under its request fingerprint; the
/// joined record never is.
pub struct Aggregator {
    source: Arc<dyn MarketDataSource>,
    cache: Arc<FingerprintCache>,
    intraday_interval: String,
    policy: AggregationPolicy,
}

impl Aggregator {
    pub fn new(source: Arc<dyn MarketDataSource>, cache: Arc<FingerprintCache>) -> Self {
        Self {
            source,
            cache,
            intraday_interval: DEFAULT_INTRADAY_INTERVAL.to_string(),
            policy: AggregationPolicy::default(),
        }
    }

    pub fn with_interval(mut self, interval: impl Into<String>) -> Self {
        self.intraday_interval = interval.into();
        self
    }

    pub fn with_policy(mut self, policy: AggregationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn cache(&self) -> &Arc<FingerprintCache> {
        &self.cache
    }

    pub fn policy(&self) -> AggregationPolicy {
        self.policy
    }

    /// Fetch all three payloads for `ticker` and join them.
    ///
    /// The ticker is used verbatim. All three fetches run concurrently and
    /// are always awaited to completion before the outcome is decided, so a
    /// failure never abandons work that would otherwise land in the cache.
    pub async fn aggregate(&self, ticker: &str) -> Result<AggregateResult, AggregationError> {
        tracing::info!("Aggregating market data for {}", ticker);

        let (intraday, daily, news) = tokio::join!(
            self.fetch_cached(UpstreamRequest::intraday(ticker, &self.intraday_interval)),
            self.fetch_cached(UpstreamRequest::daily(ticker)),
            self.fetch_cached(UpstreamRequest::news(ticker)),
        );

        let mut unavailable = Vec::new();
        let mut first_error: Option<AggregationError> = None;
        let mut settle = |operation: Operation, outcome: Result<Value, UpstreamError>| match outcome {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("{} fetch failed for {}: {}", operation, ticker, e);
                unavailable.push(operation);
                first_error.get_or_insert_with(|| AggregationError::new(ticker, operation, e));
                Value::Null
            }
        };

        let intraday = settle(Operation::TimeSeriesIntraday, intraday);
        let daily = settle(Operation::TimeSeriesDaily, daily);
        let news = settle(Operation::NewsSentiment, news);

        if let Some(err) = first_error {
            let nothing_fetched = unavailable.len() == Operation::ALL.len();
            if self.policy == AggregationPolicy::AllOrNothing || nothing_fetched {
                return Err(err);
            }
            tracing::info!(
                "Returning partial record for {} (unavailable: {:?})",
                ticker,
                unavailable
            );
        }

        let mut result = AggregateResult::new(ticker, intraday, daily, news);
        result.unavailable = unavailable;
        Ok(result)
    }

    async fn fetch_cached(&self, request: UpstreamRequest) -> Result<Value, UpstreamError> {
        let scope = self.source.credential_scope();
        let key = request.key().scoped(scope.as_deref());
        let source = &self.source;
        let request = &request;

        self.cache
            .get_or_fetch(&key, move || async move { source.fetch(request).await })
            .await
    }
}
