use async_trait::async_trait;
use market_core::{credential_scope, MarketDataSource, UpstreamError, UpstreamRequest};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

pub const BASE_URL: &str = "https://www.alphavantage.co/query";
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Top-level keys Alpha Vantage uses to report errors and quota notes
/// inside an HTTP 200 body.
const REJECTION_KEYS: [&str; 3] = ["Error Message", "Note", "Information"];

#[derive(Debug, Clone)]
pub struct AlphaVantageConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    /// Bound on a whole call, connect through body.
    pub timeout: Duration,
}

impl Default for AlphaVantageConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Thin client over the Alpha Vantage `query` endpoint.
///
/// One call per `fetch`: no caching and no retries happen here.
#[derive(Clone)]
pub struct AlphaVantageClient {
    api_key: Option<String>,
    base_url: String,
    timeout: Duration,
    client: Client,
}

impl AlphaVantageClient {
    pub fn new(config: AlphaVantageConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key: config.api_key,
            base_url: config.base_url,
            timeout: config.timeout,
            client,
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Provider query string: `function`, the request parameters, then the
    /// credential.
    fn query_pairs<'a>(&'a self, request: &'a UpstreamRequest) -> Vec<(&'a str, &'a str)> {
        let mut query = vec![("function", request.operation.function_name())];
        query.extend(
            request
                .params
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );
        if let Some(key) = &self.api_key {
            query.push(("apikey", key.as_str()));
        }
        query
    }

    // reqwest errors carry the full URL, credential included.
    fn map_error(&self, err: reqwest::Error) -> UpstreamError {
        if err.is_timeout() {
            UpstreamError::Timeout(self.timeout)
        } else if err.is_decode() {
            UpstreamError::InvalidBody(err.without_url().to_string())
        } else {
            UpstreamError::Transport(err.without_url().to_string())
        }
    }
}

#[async_trait]
impl MarketDataSource for AlphaVantageClient {
    async fn fetch(&self, request: &UpstreamRequest) -> Result<Value, UpstreamError> {
        tracing::debug!(
            function = request.operation.function_name(),
            params = ?request.params,
            "Requesting Alpha Vantage"
        );

        let response = self
            .client
            .get(&self.base_url)
            .query(&self.query_pairs(request))
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body: Value = response.json().await.map_err(|e| self.map_error(e))?;

        if let Some(message) = provider_rejection(&body) {
            tracing::warn!(
                function = request.operation.function_name(),
                "Alpha Vantage rejected request: {}",
                message
            );
            return Err(UpstreamError::Rejected { message });
        }

        Ok(body)
    }

    fn credential_scope(&self) -> Option<String> {
        self.api_key.as_deref().map(credential_scope)
    }
}

/// Detect a 200 body that carries nothing but an error or quota message.
fn provider_rejection(body: &Value) -> Option<String> {
    let obj = body.as_object()?;
    if obj.is_empty() || !obj.keys().all(|k| REJECTION_KEYS.contains(&k.as_str())) {
        return None;
    }

    REJECTION_KEYS
        .iter()
        .find_map(|k| obj.get(*k))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn client_for(server: &mockito::ServerGuard, api_key: Option<&str>) -> AlphaVantageClient {
        AlphaVantageClient::new(AlphaVantageConfig {
            api_key: api_key.map(str::to_string),
            base_url: format!("{}/query", server.url()),
            timeout: Duration::from_secs(5),
        })
    }

    #[tokio::test]
    async fn test_fetch_serializes_function_params_and_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/query")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("function".into(), "TIME_SERIES_INTRADAY".into()),
                Matcher::UrlEncoded("symbol".into(), "IBM".into()),
                Matcher::UrlEncoded("interval".into(), "5min".into()),
                Matcher::UrlEncoded("apikey".into(), "demo".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"Meta Data":{"2. Symbol":"IBM"},"Time Series (5min)":{}}"#)
            .create_async()
            .await;

        let client = client_for(&server, Some("demo"));
        let body = client
            .fetch(&UpstreamRequest::intraday("IBM", "5min"))
            .await
            .unwrap();

        assert_eq!(body["Meta Data"]["2. Symbol"], "IBM");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_payload_is_passed_through_unmodified() {
        let payload = json!({
            "items": "1",
            "feed": [{"title": "IBM beats", "overall_sentiment_score": 0.31}]
        });
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/query")
            .match_query(Matcher::UrlEncoded("tickers".into(), "IBM".into()))
            .with_status(200)
            .with_body(payload.to_string())
            .create_async()
            .await;

        let client = client_for(&server, Some("demo"));
        let body = client.fetch(&UpstreamRequest::news("IBM")).await.unwrap();
        assert_eq!(body, payload);
    }

    #[tokio::test]
    async fn test_non_success_status_is_upstream_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/query")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("service unavailable")
            .create_async()
            .await;

        let client = client_for(&server, Some("demo"));
        let err = client
            .fetch(&UpstreamRequest::daily("IBM"))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            UpstreamError::Status {
                status: 503,
                body: "service unavailable".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_quota_note_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/query")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"Note":"Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute."}"#)
            .create_async()
            .await;

        let client = client_for(&server, Some("demo"));
        let err = client
            .fetch(&UpstreamRequest::daily("IBM"))
            .await
            .unwrap_err();

        match err {
            UpstreamError::Rejected { message } => assert!(message.contains("call frequency")),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_json_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/query")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let client = client_for(&server, Some("demo"));
        let err = client
            .fetch(&UpstreamRequest::daily("IBM"))
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidBody(_)));
    }

    #[tokio::test]
    async fn test_transport_error_does_not_leak_credential() {
        let client = AlphaVantageClient::new(AlphaVantageConfig {
            api_key: Some("very-secret-key".to_string()),
            base_url: "http://127.0.0.1:1/query".to_string(),
            timeout: Duration::from_secs(2),
        });

        let err = client
            .fetch(&UpstreamRequest::daily("IBM"))
            .await
            .unwrap_err();

        assert!(matches!(err, UpstreamError::Transport(_)), "got {:?}", err);
        assert!(!err.to_string().contains("very-secret-key"));
    }

    #[tokio::test]
    async fn test_silent_server_is_reported_as_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept connections and hold them open without ever answering.
        let server = tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });

        let timeout = Duration::from_millis(100);
        let client = AlphaVantageClient::new(AlphaVantageConfig {
            api_key: Some("very-secret-key".to_string()),
            base_url: format!("http://{}/query", addr),
            timeout,
        });

        let err = client
            .fetch(&UpstreamRequest::daily("IBM"))
            .await
            .unwrap_err();

        assert_eq!(err, UpstreamError::Timeout(timeout));
        assert_eq!(err.status(), None);
        assert!(!err.to_string().contains("very-secret-key"));
        server.abort();
    }

    #[test]
    fn test_query_omits_missing_key() {
        let client = AlphaVantageClient::new(AlphaVantageConfig::default());
        let request = UpstreamRequest::daily("IBM");
        let query = client.query_pairs(&request);
        assert_eq!(query[0], ("function", "TIME_SERIES_DAILY"));
        assert!(query.iter().all(|(k, _)| *k != "apikey"));
        assert!(!client.has_api_key());
        assert!(client.credential_scope().is_none());
    }

    #[test]
    fn test_rejection_detection_ignores_real_payloads() {
        assert!(provider_rejection(&json!({"Meta Data": {}, "Information": "x"})).is_none());
        assert!(provider_rejection(&json!({})).is_none());
        assert_eq!(
            provider_rejection(&json!({"Error Message": "Invalid API call."})),
            Some("Invalid API call.".to_string())
        );
    }
}
