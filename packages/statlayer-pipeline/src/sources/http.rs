//! Shared HTTP client with bounded in-flight requests.

use crate::error::FetchError;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

const USER_AGENT: &str = concat!("statlayer/", env!("CARGO_PKG_VERSION"));

#[derive(Clone)]
pub struct HttpClient {
    base_url: String,
    client: Client,
    concurrency_limiter: Arc<Semaphore>,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(
        base_url: impl Into<String>,
        concurrent_request_limit: usize,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let base_url = base_url.into();
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Http {
                url: base_url.clone(),
                message: e.to_string(),
            })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            concurrency_limiter: Arc::new(Semaphore::new(concurrent_request_limit.max(1))),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(&self, path: &str, query: &[(&str, String)]) -> Result<reqwest::Response, FetchError> {
        let _permit = self.concurrency_limiter.acquire().await;
        let url = self.url(path);
        debug!("GET {} {:?}", url, query.iter().map(|(k, _)| *k).collect::<Vec<_>>());

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| request_error(&url, e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let url = self.url(path);
        let response = self.send(path, query).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| FetchError::malformed(url, e))
    }

    pub async fn get_text(&self, path: &str, query: &[(&str, String)]) -> Result<String, FetchError> {
        let url = self.url(path);
        let response = self.send(path, query).await?;
        response
            .text()
            .await
            .map_err(|e| request_error(&url, e, self.timeout))
    }
}

fn request_error(url: &str, e: reqwest::Error, timeout: Duration) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout(timeout)
    } else {
        // Query strings may carry credentials; report the path only
        FetchError::Http {
            url: url.to_string(),
            message: e.without_url().to_string(),
        }
    }
}
