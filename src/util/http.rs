use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client};
use serde_json::Value;
use std::time::Duration;

/// Body of a binary GET together with its declared content type.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("response from {url} could not be decoded: {message}")]
    Decode { url: String, message: String },
}

/// GET-only HTTP capability the pipeline depends on.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn get_json(&self, url: &str, query: &[(String, String)]) -> Result<Value, FetchError>;

    async fn get_text(&self, url: &str) -> Result<String, FetchError>;

    async fn get_bytes(&self, url: &str) -> Result<FetchedBody, FetchError>;
}

/// [`HttpFetch`] over a shared `reqwest` client; every request is bounded by the
/// client timeout.
#[derive(Debug, Clone)]
pub struct ReqwestFetch {
    http: Client,
}

impl ReqwestFetch {
    pub fn new(timeout: Duration, user_agent: &str) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { http })
    }

    async fn send(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> Result<reqwest::Response, FetchError> {
        let resp = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| classify(url, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(resp)
    }
}

fn classify(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Transport {
            url: url.to_string(),
            source: err,
        }
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetch {
    async fn get_json(&self, url: &str, query: &[(String, String)]) -> Result<Value, FetchError> {
        let resp = self.send(url, query).await?;
        let body = resp.bytes().await.map_err(|e| classify(url, e))?;
        serde_json::from_slice(&body).map_err(|e| FetchError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let resp = self.send(url, &[]).await?;
        resp.text().await.map_err(|e| classify(url, e))
    }

    async fn get_bytes(&self, url: &str) -> Result<FetchedBody, FetchError> {
        let resp = self.send(url, &[]).await?;
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let bytes = resp.bytes().await.map_err(|e| classify(url, e))?;
        Ok(FetchedBody {
            bytes,
            content_type,
        })
    }
}
