//! Cancellable retrieval of audio bytes.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::handles::{HandleRegistry, ResolvedHandle};
use crate::util::{compact_text, is_http_url};

const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Turns a source reference into raw bytes.
pub trait SourceFetcher: Send + Sync + 'static {
    /// Fetch `source`. Must return [`Error::Cancelled`] promptly once
    /// `cancel` fires.
    fn fetch(
        &self,
        source: &str,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// Fetcher for session handles and `http(s)` URLs.
#[derive(Debug, Clone)]
pub struct NetworkFetcher {
    client: reqwest::Client,
    handles: HandleRegistry,
}

impl NetworkFetcher {
    pub fn new(handles: HandleRegistry) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self { client, handles })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Playback(format!(
                "HTTP error! status: {status} {}",
                compact_text(&body)
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

impl SourceFetcher for NetworkFetcher {
    async fn fetch(&self, source: &str, cancel: &CancellationToken) -> Result<Vec<u8>> {
        if ResolvedHandle::is_session_url(source) {
            return self
                .handles
                .bytes(source)
                .map(|bytes| bytes.to_vec())
                .ok_or_else(|| Error::Playback(format!("handle {source} is no longer valid")));
        }
        if !is_http_url(source) {
            return Err(Error::Playback(format!("unsupported source '{source}'")));
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled),
            result = self.download(source) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn session_handles_are_read_from_registry() {
        let handles = HandleRegistry::new();
        let handle = handles.create(b"RIFF".to_vec());
        let fetcher = NetworkFetcher::new(handles).unwrap();

        let bytes = fetcher
            .fetch(handle.as_str(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(bytes, b"RIFF");
    }

    #[tokio::test]
    async fn revoked_handles_fail() {
        let handles = HandleRegistry::new();
        let handle = handles.create(b"x".to_vec());
        handles.revoke(&handle);
        let fetcher = NetworkFetcher::new(handles).unwrap();

        let error = fetcher
            .fetch(handle.as_str(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Playback(_)));
    }

    #[tokio::test]
    async fn unknown_schemes_are_rejected() {
        let fetcher = NetworkFetcher::new(HandleRegistry::new()).unwrap();
        let error = fetcher
            .fetch("ftp://example.com/a.wav", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Playback(_)));
    }

    #[tokio::test]
    async fn cancelled_download_returns_cancelled() {
        let fetcher = NetworkFetcher::new(HandleRegistry::new()).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        // Unroutable address; cancellation wins before any connect completes
        let error = fetcher
            .fetch("http://10.255.255.1/track.wav", &token)
            .await
            .unwrap_err();
        assert!(error.is_cancelled());
    }
}
