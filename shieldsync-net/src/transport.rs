//! Pluggable transport seam between the pool and a concrete wire protocol.

use crate::error::NetResult;
use async_trait::async_trait;
use shieldsync_types::Endpoint;

/// A single call against a block-data service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainCall {
    /// Basic chain metadata: `{chainName, blockHeight, vendor}`.
    Metadata,
    /// Current tip: `{height, hash}`.
    LatestBlock,
    /// Inclusive height range: `[{height, hash}, ...]`.
    BlockRange { start: u64, end: u64 },
    /// Raw transaction by id: `{data, height}`.
    Transaction { txid: String },
}

impl ChainCall {
    pub fn name(&self) -> &'static str {
        match self {
            ChainCall::Metadata => "metadata",
            ChainCall::LatestBlock => "latest_block",
            ChainCall::BlockRange { .. } => "block_range",
            ChainCall::Transaction { .. } => "transaction",
        }
    }
}

/// Sends a [`ChainCall`] to one endpoint and returns the raw JSON reply.
///
/// Implementations must not retry; failover is the pool's job.
#[async_trait]
pub trait ChainTransport: Send + Sync {
    async fn call(&self, endpoint: &Endpoint, call: &ChainCall) -> NetResult<serde_json::Value>;
}
