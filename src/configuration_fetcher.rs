//! Fetching configuration from the remote source.
use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use reqwest::{header::ETAG, StatusCode};

use crate::{flag_config::Config, Error, Result};

/// Header used to present the stored revalidation token.
pub const IF_NONE_MATCH: &str = "If-None-Match";

/// Response of a (conditional) configuration fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchResponse {
    /// `None` when the server has no new body for us (e.g., "not modified").
    pub data: Option<Config>,
    /// Revalidation token returned by the server.
    pub etag: Option<String>,
}

/// A transport that retrieves configuration. Returns an error on non-success responses.
#[async_trait]
pub trait ConfigFetcher: Send + Sync {
    async fn fetch(&self, url: &str, headers: &HashMap<String, String>) -> Result<FetchResponse>;
}

#[async_trait]
impl<T: ConfigFetcher + ?Sized> ConfigFetcher for Arc<T> {
    async fn fetch(&self, url: &str, headers: &HashMap<String, String>) -> Result<FetchResponse> {
        (**self).fetch(url, headers).await
    }
}

/// HTTP fetcher backed by `reqwest`.
#[derive(Debug, Default, Clone)]
pub struct HttpConfigFetcher {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::Client,
}

impl HttpConfigFetcher {
    pub fn new() -> Self {
        HttpConfigFetcher::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        HttpConfigFetcher { client }
    }
}

#[async_trait]
impl ConfigFetcher for HttpConfigFetcher {
    async fn fetch(&self, url: &str, headers: &HashMap<String, String>) -> Result<FetchResponse> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        log::debug!(target: "ffclient", url; "fetching configuration");
        let response = request.send().await?;

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            log::debug!(target: "ffclient", "configuration not modified");
            return Ok(FetchResponse { data: None, etag });
        }
        if !status.is_success() {
            log::warn!(target: "ffclient", status = status.as_u16(); "received non-success response while fetching configuration");
            return Err(Error::UnexpectedStatus(status.as_u16()));
        }

        let body = response.bytes().await?;
        let data = serde_json::from_slice(&body)?;

        log::debug!(target: "ffclient", "successfully fetched configuration");
        Ok(FetchResponse {
            data: Some(data),
            etag,
        })
    }
}

#[cfg(test)]
pub(crate) use testing::StaticFetcher;
