//! Snapshot fetching
//!
//! The reconciliation state machine needs a point-in-time book snapshot
//! whenever a symbol initializes or falls out of sync. The trait keeps
//! the engine testable; the production implementation wraps the
//! exchange's REST depth endpoint with a request timeout. Retry and
//! backoff are the caller's job (see [`crate::builder`]).

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use crate::config::SymbolPrecision;
use crate::events::{RawSnapshot, Snapshot};
use crate::fixed_point::CodecError;

/// Futures depth endpoint.
pub const FUTURES_DEPTH_URL: &str = "https://fapi.binance.com/fapi/v1/depth";

/// Errors from a snapshot fetch attempt. All variants are retryable
/// from the caller's point of view.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("snapshot request failed: {0}")]
    Transport(String),

    #[error("snapshot request returned status {0}")]
    Status(u16),

    #[error("snapshot payload decode failed: {0}")]
    Decode(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("no precision configured for symbol: {0}")]
    UnknownSymbol(String),
}

/// Supplies point-in-time book snapshots on demand.
#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    async fn fetch(&self, symbol: &str, depth: usize) -> Result<Snapshot, FetchError>;
}

/// REST implementation of [`SnapshotFetcher`].
pub struct RestSnapshotFetcher {
    client: reqwest::Client,
    base_url: String,
    precisions: HashMap<String, SymbolPrecision>,
}

impl RestSnapshotFetcher {
    pub fn new(
        base_url: impl Into<String>,
        precisions: HashMap<String, SymbolPrecision>,
        timeout: std::time::Duration,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            precisions,
        })
    }

    fn request_url(&self, symbol: &str, depth: usize) -> String {
        format!("{}?symbol={}&limit={}", self.base_url, symbol, depth)
    }
}

#[async_trait]
impl SnapshotFetcher for RestSnapshotFetcher {
    async fn fetch(&self, symbol: &str, depth: usize) -> Result<Snapshot, FetchError> {
        let precision = self
            .precisions
            .get(symbol)
            .ok_or_else(|| FetchError::UnknownSymbol(symbol.to_string()))?;

        let url = self.request_url(symbol, depth);
        debug!(symbol, %url, "fetching book snapshot");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let raw: RawSnapshot = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        Ok(raw.into_snapshot(symbol, precision)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_request_url() {
        let fetcher = RestSnapshotFetcher::new(
            FUTURES_DEPTH_URL,
            HashMap::new(),
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(
            fetcher.request_url("BTCUSDT", 1000),
            "https://fapi.binance.com/fapi/v1/depth?symbol=BTCUSDT&limit=1000"
        );
    }

    #[tokio::test]
    async fn test_unknown_symbol_rejected_before_request() {
        let fetcher = RestSnapshotFetcher::new(
            FUTURES_DEPTH_URL,
            HashMap::new(),
            Duration::from_secs(5),
        )
        .unwrap();

        let err = fetcher.fetch("BTCUSDT", 1000).await.unwrap_err();
        assert!(matches!(err, FetchError::UnknownSymbol(_)));
    }
}
