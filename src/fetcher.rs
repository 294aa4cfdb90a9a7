use std::time::Duration;

use async_trait::async_trait;

use crate::config::CONFIG;
use crate::error::{FetchError, Result};
use crate::query_codec::QueryCodec;

/// Transport collaborator: turns a page address into raw document bytes.
///
/// Retries and timeouts are the implementation's business; the extraction
/// side only sees the final outcome of each call.
#[async_trait]
pub trait AdFetcher: Send + Sync {
    async fn fetch_by_url(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError>;

    async fn fetch_by_id(&self, id: &str, category: &str) -> std::result::Result<Vec<u8>, FetchError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    codec: QueryCodec,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client, codec: QueryCodec) -> HttpFetcher {
        HttpFetcher { client, codec }
    }

    pub fn from_config() -> Result<HttpFetcher> {
        let client = reqwest::Client::builder()
            .user_agent(CONFIG.user_agent.as_str())
            .timeout(Duration::from_secs(CONFIG.fetch_timeout_secs))
            .build()
            .map_err(FetchError::Transport)?;
        Ok(HttpFetcher::new(client, QueryCodec::from_config()?))
    }
}

#[async_trait]
impl AdFetcher for HttpFetcher {
    async fn fetch_by_url(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
        log::info!("fetching {url}");
        let res = self.client.get(url).send().await.map_err(|e| classify(url, e))?;
        let status = res.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = res.bytes().await.map_err(|e| classify(url, e))?;
        Ok(body.to_vec())
    }

    async fn fetch_by_id(&self, id: &str, category: &str) -> std::result::Result<Vec<u8>, FetchError> {
        let url = self.codec.ad_url(category, id);
        self.fetch_by_url(&url).await
    }
}

fn classify(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout { url: url.to_string() }
    } else {
        FetchError::Transport(e)
    }
}
