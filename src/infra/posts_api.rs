//! HTTP adapter for the posts API.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Url, header};
use tracing::debug;

use crate::application::source::{PostsSource, SourceError};
use crate::domain::posts;

use super::error::InfraError;

/// Fetches the posts list over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpPostsSource {
    client: Client,
    url: Url,
}

impl HttpPostsSource {
    pub fn new(url: Url) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .build()
            .map_err(|err| InfraError::remote(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { client, url })
    }

    pub fn user_agent() -> &'static str {
        concat!("cachet/", env!("CARGO_PKG_VERSION"))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl PostsSource for HttpPostsSource {
    async fn fetch_posts(&self) -> Result<Bytes, SourceError> {
        let resp = self
            .client
            .get(self.url.clone())
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(SourceError::transport)?;

        let status = resp.status();
        let body = resp.bytes().await.map_err(SourceError::transport)?;
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let count = posts::decode(&body)
            .map_err(|err| SourceError::Body(err.to_string()))?
            .len();
        debug!(url = %self.url, count, bytes = body.len(), "posts fetched");

        Ok(body)
    }
}
