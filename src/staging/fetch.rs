//! Streaming download of a task's audio payload.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;

use crate::error::FetchError;

/// Body of a download, yielded chunk by chunk.
pub type ByteStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// A download whose length is known before any byte is consumed.
pub struct FetchedPayload {
    pub content_length: u64,
    pub stream: ByteStream,
}

/// Retrieves a remote resource as a byte stream.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPayload, FetchError>;
}

/// Fetches over HTTP(S) with reqwest.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPayload, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_length = response
            .content_length()
            .ok_or(FetchError::MissingContentLength)?;

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| FetchError::Stream(e.to_string())))
            .boxed();

        Ok(FetchedPayload {
            content_length,
            stream,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connection_refused_is_request_error() {
        let fetcher = HttpFetcher::new(reqwest::Client::new());
        let err = fetcher.fetch("http://127.0.0.1:9/call.wav").await.err().unwrap();
        assert!(matches!(err, FetchError::Request(_)));
    }
}
