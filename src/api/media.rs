//! Fetching the audio bytes of a track.

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use log::{debug, warn};
use reqwest::header::REFERER;

use crate::api::error::{ApiError, ApiResult};
use crate::api::session::ClientSettings;
use crate::utils::urls::https_url;

/// An audio body as it arrives from the network.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn open(&self, url: &str) -> ApiResult<ByteStream>;
}

pub struct HttpMediaFetcher {
    client: reqwest::Client,
    referer: Option<String>,
}

impl HttpMediaFetcher {
    pub fn new(settings: &ClientSettings) -> ApiResult<Self> {
        let client = settings
            .media_client()
            .map_err(|source| ApiError::Transport {
                url: settings.entry_url.clone(),
                source,
            })?;

        Ok(Self {
            client,
            referer: Some(settings.entry_url.clone()),
        })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            referer: None,
        }
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn open(&self, url: &str) -> ApiResult<ByteStream> {
        let url = https_url(url);
        debug!("Request: GET {url}");

        let mut request = self.client.get(&url);
        if let Some(referer) = &self.referer {
            request = request.header(REFERER, referer.as_str());
        }

        let response = request.send().await.map_err(|source| {
            warn!("Request error: {source}");
            ApiError::Transport {
                url: url.clone(),
                source,
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!("Error response {} for {url}", status.as_u16());
            return Err(ApiError::ApiRequest {
                url,
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        Ok(response.bytes_stream().map(|chunk| chunk.map_err(io::Error::other)).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_streams_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/track.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .mount(&server)
            .await;

        let fetcher = HttpMediaFetcher::with_client(reqwest::Client::new());
        let chunks: Vec<Bytes> = fetcher
            .open(&format!("{}/track.mp4", server.uri()))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        let total: usize = chunks.iter().map(|c| c.len()).sum();
        assert_eq!(total, 4096);
    }

    #[tokio::test]
    async fn test_missing_asset_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpMediaFetcher::with_client(reqwest::Client::new());
        let err = match fetcher.open(&format!("{}/gone.mp4", server.uri())).await {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        };
        assert_eq!(err.status(), Some(404));
    }
}
