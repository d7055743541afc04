use async_trait::async_trait;
use selectsync_api::ApiClient;
use selectsync_types::{FetchRequest, FetchResponse};
use selectsync_util::send_option_request;

use crate::SelectError;

/// Transport seam used by the field runtime.
#[async_trait]
pub trait OptionFetcher: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, SelectError>;
}

/// Fetcher backed by the shared HTTP client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: ApiClient,
}

impl HttpFetcher {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Builds a fetcher from `SELECTSYNC_*` environment settings.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::new(ApiClient::new_from_env()?))
    }
}

#[async_trait]
impl OptionFetcher for HttpFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, SelectError> {
        send_option_request(&self.client, &request).await.map_err(SelectError::from)
    }
}
