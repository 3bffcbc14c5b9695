use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::RequestKey;

/// Provider function backing one field of the aggregate record.
///
/// Serialized by field name (`intraday`, `daily`, `news`); displayed by the
/// provider function name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    #[serde(rename = "intraday")]
    TimeSeriesIntraday,
    #[serde(rename = "daily")]
    TimeSeriesDaily,
    #[serde(rename = "news")]
    NewsSentiment,
}

impl Operation {
    pub const ALL: [Operation; 3] = [
        Operation::TimeSeriesIntraday,
        Operation::TimeSeriesDaily,
        Operation::NewsSentiment,
    ];

    /// Value of the provider's `function` query parameter.
    pub fn function_name(&self) -> &'static str {
        match self {
            Operation::TimeSeriesIntraday => "TIME_SERIES_INTRADAY",
            Operation::TimeSeriesDaily => "TIME_SERIES_DAILY",
            Operation::NewsSentiment => "NEWS_SENTIMENT",
        }
    }

    /// Name of the aggregate record field this operation fills.
    pub fn field_name(&self) -> &'static str {
        match self {
            Operation::TimeSeriesIntraday => "intraday",
            Operation::TimeSeriesDaily => "daily",
            Operation::NewsSentiment => "news",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.function_name())
    }
}

/// A fully parameterized provider call, minus the credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamRequest {
    pub operation: Operation,
    pub params: BTreeMap<String, String>,
}

impl UpstreamRequest {
    pub fn new<I, K, V>(operation: Operation, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            operation,
            params: params
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn intraday(symbol: &str, interval: &str) -> Self {
        Self::new(
            Operation::TimeSeriesIntraday,
            [("symbol", symbol), ("interval", interval)],
        )
    }

    pub fn daily(symbol: &str) -> Self {
        Self::new(Operation::TimeSeriesDaily, [("symbol", symbol)])
    }

    /// News sentiment takes a comma-separated `tickers` list; one symbol here.
    pub fn news(symbol: &str) -> Self {
        Self::new(Operation::NewsSentiment, [("tickers", symbol)])
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.operation.function_name(), &self.params)
    }
}

/// Combined intraday, daily and news payloads for one ticker.
///
/// Payloads are the provider's JSON passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub ticker: String,
    pub intraday: Value,
    pub daily: Value,
    pub news: Value,
    /// Fields that could not be fetched. Only ever populated when partial
    /// results are enabled; omitted from the wire shape when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unavailable: Vec<Operation>,
}

impl AggregateResult {
    pub fn new(ticker: impl Into<String>, intraday: Value, daily: Value, news: Value) -> Self {
        Self {
            ticker: ticker.into(),
            intraday,
            daily,
            news,
            unavailable: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.unavailable.is_empty()
    }
}
