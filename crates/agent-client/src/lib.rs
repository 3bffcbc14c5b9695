//! Client for the aggregator and the downstream analysis and report
//! services.

pub mod error;

pub use error::{ClientError, ClientResult};

use market_core::AggregateResult;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub aggregator_url: String,
    pub analysis_url: String,
    pub report_url: String,
    pub timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            aggregator_url: std::env::var("AGGREGATOR_URL")
                .unwrap_or_else(|_| "http://localhost:3001".to_string()),
            analysis_url: std::env::var("ANALYSIS_URL")
                .unwrap_or_else(|_| "http://localhost:8001/analysis".to_string()),
            report_url: std::env::var("REPORT_URL")
                .unwrap_or_else(|_| "http://localhost:8002/report".to_string()),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Technical metrics computed by the analysis service from a daily series.
///
/// Metrics can come back `null` when the series is too short.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMetrics {
    #[serde(default)]
    pub ticker: Option<String>,
    pub ma50: Option<f64>,
    pub ma200: Option<f64>,
    pub rsi: Option<f64>,
    pub volatility: Option<f64>,
    /// Anything else the service reports, kept for the report request.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize)]
struct AnalysisRequest<'a> {
    ticker: &'a str,
    daily: &'a Value,
}

#[derive(Serialize)]
struct ReportRequest<'a> {
    ticker: &'a str,
    analysis: &'a AnalysisMetrics,
    daily: &'a Value,
}

#[derive(Clone)]
pub struct AgentClient {
    client: reqwest::Client,
    config: AgentConfig,
}

impl AgentClient {
    pub fn new(config: AgentConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { client, config }
    }

    pub fn with_defaults() -> Self {
        Self::new(AgentConfig::default())
    }

    /// Live intraday, daily and news data for `ticker`.
    pub async fn fetch_base_data(&self, ticker: &str) -> ClientResult<AggregateResult> {
        self.get_record("fetch", ticker).await
    }

    /// Fixture record with the live shape; costs no provider quota.
    pub async fn fetch_demo_data(&self, ticker: &str) -> ClientResult<AggregateResult> {
        self.get_record("fetch/demo", ticker).await
    }

    pub async fn fetch_analysis(&self, ticker: &str, daily: &Value) -> ClientResult<AnalysisMetrics> {
        let response = self
            .client
            .post(&self.config.analysis_url)
            .json(&AnalysisRequest { ticker, daily })
            .send()
            .await?;

        let response = check_status(response).await?;
        response
            .json::<AnalysisMetrics>()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    /// PDF report bytes.
    pub async fn generate_report(
        &self,
        ticker: &str,
        analysis: &AnalysisMetrics,
        daily: &Value,
    ) -> ClientResult<Vec<u8>> {
        let response = self
            .client
            .post(&self.config.report_url)
            .json(&ReportRequest {
                ticker,
                analysis,
                daily,
            })
            .send()
            .await?;

        let response = check_status(response).await?;
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(ClientError::InvalidResponse("Empty report".to_string()));
        }
        tracing::debug!("Received {} byte report for {}", bytes.len(), ticker);
        Ok(bytes.to_vec())
    }

    async fn get_record(&self, path: &str, ticker: &str) -> ClientResult<AggregateResult> {
        let url = format!("{}/{}", self.config.aggregator_url.trim_end_matches('/'), path);
        let response = self
            .client
            .get(&url)
            .query(&[("ticker", ticker)])
            .send()
            .await?;

        let response = check_status(response).await?;
        response
            .json::<AggregateResult>()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }
}

/// Turn a non-success response into `ClientError::Status`, preferring the
/// service's own `error` / `detail` message over the raw body.
async fn check_status(response: reqwest::Response) -> ClientResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .or_else(|| v.get("detail"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or(body);

    tracing::warn!("Service call failed with {}: {}", status, message);
    Err(ClientError::Status {
        status: status.as_u16(),
        message,
    })
}
