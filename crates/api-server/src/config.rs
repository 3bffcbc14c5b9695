use anyhow::{Context, Result};
use market_aggregator::{AggregationPolicy, DEFAULT_INTRADAY_INTERVAL, DEFAULT_MAX_ENTRIES, DEFAULT_TTL_SECS};
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Alpha Vantage credential. Missing is allowed: the server starts and
    /// upstream calls fail authentication.
    pub api_key: Option<String>,
    pub bind_address: String,
    pub port: u16,
    pub base_url: String,
    pub cache_ttl: Duration,
    pub cache_max_entries: usize,
    pub upstream_timeout: Duration,
    pub intraday_interval: String,
    pub policy: AggregationPolicy,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let allow_partial = var("ALLOW_PARTIAL_RESULTS")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        Ok(Self {
            api_key: var("ALPHA_VANTAGE_API_KEY"),
            bind_address: var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_var(var("PORT"), "PORT", 3001)?,
            base_url: var("ALPHA_VANTAGE_BASE_URL")
                .unwrap_or_else(|| alpha_vantage_client::BASE_URL.to_string()),
            cache_ttl: Duration::from_secs(parse_var(
                var("CACHE_TTL_SECS"),
                "CACHE_TTL_SECS",
                DEFAULT_TTL_SECS,
            )?),
            cache_max_entries: parse_var(
                var("CACHE_MAX_ENTRIES"),
                "CACHE_MAX_ENTRIES",
                DEFAULT_MAX_ENTRIES,
            )?,
            upstream_timeout: Duration::from_secs(parse_var(
                var("UPSTREAM_TIMEOUT_SECS"),
                "UPSTREAM_TIMEOUT_SECS",
                alpha_vantage_client::DEFAULT_TIMEOUT_SECS,
            )?),
            intraday_interval: var("INTRADAY_INTERVAL")
                .unwrap_or_else(|| DEFAULT_INTRADAY_INTERVAL.to_string()),
            policy: if allow_partial {
                AggregationPolicy::Partial
            } else {
                AggregationPolicy::AllOrNothing
            },
        })
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.bind_address, self.port))
    }
}

fn parse_var<T>(value: Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a number, got {:?}", name, raw)),
        None => Ok(default),
    }
}
