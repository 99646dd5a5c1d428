//! Destinations for fan-out results.

use async_trait::async_trait;
use tokio::sync::mpsc;

use tlsmark_common::FingerprintResult;

/// Caller-owned queue receiving exactly one result per dispatched target.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Returns `false` when the receiving side is gone.
    async fn deliver(&self, result: FingerprintResult) -> bool;
}

#[async_trait]
impl ResultSink for mpsc::Sender<FingerprintResult> {
    async fn deliver(&self, result: FingerprintResult) -> bool {
        self.send(result).await.is_ok()
    }
}

#[async_trait]
impl ResultSink for mpsc::UnboundedSender<FingerprintResult> {
    async fn deliver(&self, result: FingerprintResult) -> bool {
        self.send(result).is_ok()
    }
}
