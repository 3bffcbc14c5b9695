use async_trait::async_trait;
use serde_json::Value;

use crate::{UpstreamError, UpstreamRequest};

/// A market-data provider able to answer one parameterized request.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch(&self, request: &UpstreamRequest) -> Result<Value, UpstreamError>;

    /// Scope appended to cache keys so responses obtained with different
    /// credentials never share a slot.
    fn credential_scope(&self) -> Option<String> {
        None
    }
}
