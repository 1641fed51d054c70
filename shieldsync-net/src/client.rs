//! Network client: every public call is a thin wrapper over `with_failover`.

use crate::config::NetConfig;
use crate::error::NetResult;
use crate::http_transport::HttpTransport;
use crate::pool::EndpointPool;
use crate::response::{parse_blocks, parse_height, parse_metadata, parse_raw_transaction};
use crate::transport::{ChainCall, ChainTransport};
use serde_json::Value;
use shieldsync_types::{ChainMetadata, CompactBlock, Endpoint, RawTransaction};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const MIN_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Fault-tolerant client for a set of block-data endpoints.
pub struct NetworkClient {
    pool: EndpointPool,
    transport: Arc<dyn ChainTransport>,
    config: NetConfig,
}

impl NetworkClient {
    /// Creates a client that speaks HTTP/JSON to the configured endpoints.
    ///
    /// Fails with `NetError::Config` if `config` doesn't validate.
    pub fn new(config: NetConfig) -> NetResult<Self> {
        config.validate()?;
        let transport = Arc::new(HttpTransport::new(config.request_timeout())?);
        Ok(Self::with_transport(config, transport))
    }

    pub fn with_transport(config: NetConfig, transport: Arc<dyn ChainTransport>) -> Self {
        let pool = EndpointPool::new(
            config.endpoints.clone(),
            Arc::clone(&transport),
            config.probe_timeout(),
        );
        Self {
            pool,
            transport,
            config,
        }
    }

    pub fn pool(&self) -> &EndpointPool {
        &self.pool
    }

    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    pub async fn select_best_endpoint(&self) -> NetResult<Endpoint> {
        self.pool.select_best_endpoint(self.config.probe_timeout()).await
    }

    /// Issues `call` with failover, decoding the reply with `decode`.
    ///
    /// A reply that fails to decode counts as an endpoint failure.
    async fn call_with_failover<T>(
        &self,
        call: ChainCall,
        decode: impl Fn(&str, &Value) -> NetResult<T>,
    ) -> NetResult<T> {
        let call = &call;
        let decode = &decode;
        self.pool
            .with_failover(|endpoint| {
                let transport = Arc::clone(&self.transport);
                async move {
                    let reply = transport.call(&endpoint, call).await?;
                    decode(&endpoint.id, &reply)
                }
            })
            .await
    }

    pub async fn get_metadata(&self) -> NetResult<ChainMetadata> {
        self.call_with_failover(ChainCall::Metadata, parse_metadata).await
    }

    pub async fn get_latest_height(&self) -> NetResult<u64> {
        self.call_with_failover(ChainCall::LatestBlock, |endpoint, reply| {
            parse_height(endpoint, reply.get("height"), "height")
        })
        .await
    }

    /// Fetches compact blocks for the inclusive range `[start, end]`.
    pub async fn get_block_range(&self, start: u64, end: u64) -> NetResult<Vec<CompactBlock>> {
        if start > end {
            return Ok(Vec::new());
        }
        let blocks = self
            .call_with_failover(ChainCall::BlockRange { start, end }, parse_blocks)
            .await?;
        debug!("fetched {} blocks for {start}..={end}", blocks.len());
        Ok(blocks)
    }

    pub async fn get_transaction(&self, txid: &str) -> NetResult<RawTransaction> {
        let call = ChainCall::Transaction {
            txid: txid.to_string(),
        };
        self.call_with_failover(call, |endpoint, reply| {
            parse_raw_transaction(endpoint, txid, reply)
        })
        .await
    }

    /// Periodically re-runs selection so endpoints marked unhealthy can
    /// recover without waiting for every other candidate to fail.
    ///
    /// Intervals below one second are raised to one second.
    pub fn spawn_health_monitor(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let interval = interval.max(MIN_HEALTH_CHECK_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // Skip first immediate tick
            ticker.tick().await;
            info!("endpoint health monitor running every {interval:?}");

            loop {
                ticker.tick().await;
                match self.select_best_endpoint().await {
                    Ok(endpoint) => debug!("health check: active endpoint {}", endpoint.id),
                    Err(e) => warn!("health check failed: {e}"),
                }
            }
        })
    }
}
