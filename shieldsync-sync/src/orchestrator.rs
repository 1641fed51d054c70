//! Incremental sync runs.
//!
//! A run finds the chain tip, picks a start height, walks `[start, tip]` in
//! fixed-size chunks, fetches each chunk with bounded retries and hands it to
//! the worker. Each step is awaited before the next one is issued, so the
//! worker sees chunks in order.

use crate::bridge::WorkerBridge;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::protocol::IngestRange;
use async_trait::async_trait;
use shieldsync_net::{NetResult, NetworkClient};
use shieldsync_types::{CompactBlock, DecryptedSnapshot, SyncStatus};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Where a run gets chain data from.
#[async_trait]
pub trait BlockSource: Send + Sync {
    async fn latest_height(&self) -> NetResult<u64>;

    /// Compact blocks for the inclusive range `[start, end]`.
    async fn block_range(&self, start: u64, end: u64) -> NetResult<Vec<CompactBlock>>;
}

#[async_trait]
impl BlockSource for NetworkClient {
    async fn latest_height(&self) -> NetResult<u64> {
        self.get_latest_height().await
    }

    async fn block_range(&self, start: u64, end: u64) -> NetResult<Vec<CompactBlock>> {
        self.get_block_range(start, end).await
    }
}

/// Splits `[start, tip]` into inclusive chunks of at most `chunk_size` heights.
pub fn chunk_ranges(start: u64, tip: u64, chunk_size: u64) -> Vec<(u64, u64)> {
    let size = chunk_size.max(1);
    let mut ranges = Vec::new();
    let mut chunk_start = start;
    while chunk_start <= tip {
        let chunk_end = chunk_start.saturating_add(size - 1).min(tip);
        ranges.push((chunk_start, chunk_end));
        if chunk_end == tip {
            break;
        }
        chunk_start = chunk_end + 1;
    }
    ranges
}

/// A running shielded sync session: worker, block source and run policy.
pub struct ShieldedSync {
    bridge: WorkerBridge,
    source: Arc<dyn BlockSource>,
    config: SyncConfig,
    run_lock: Mutex<()>,
    health_monitor: Option<JoinHandle<()>>,
}

impl ShieldedSync {
    /// Wraps an already initialised bridge.
    pub fn new(bridge: WorkerBridge, source: Arc<dyn BlockSource>, config: SyncConfig) -> Self {
        Self {
            bridge,
            source,
            config,
            run_lock: Mutex::new(()),
            health_monitor: None,
        }
    }

    pub(crate) fn with_health_monitor(mut self, monitor: JoinHandle<()>) -> Self {
        self.health_monitor = Some(monitor);
        self
    }

    pub fn bridge(&self) -> &WorkerBridge {
        &self.bridge
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Syncs from `from_height` (or the lookback window) up to the chain tip.
    ///
    /// Runs on one session never overlap; a second call waits for the first.
    /// On failure the cached status moves to the error stage.
    pub async fn full_sync(&self, from_height: Option<u64>) -> SyncResult<SyncStatus> {
        let _run = self.run_lock.lock().await;

        match self.run(from_height).await {
            Ok(status) => Ok(status),
            Err(e) => {
                error!("sync failed: {e}");
                if !self.bridge.is_terminated() {
                    self.bridge.set_status(self.bridge.status().into_error(e.to_string()));
                }
                Err(e)
            }
        }
    }

    /// Same as [`full_sync`](Self::full_sync).
    pub async fn sync(&self, from_height: Option<u64>) -> SyncResult<SyncStatus> {
        self.full_sync(from_height).await
    }

    async fn run(&self, from_height: Option<u64>) -> SyncResult<SyncStatus> {
        let tip = self.source.latest_height().await?;
        let start = from_height.unwrap_or_else(|| self.config.default_start(tip));

        if start > tip {
            info!("already synced: start {start} is past tip {tip}");
            let status = SyncStatus::ready_at(tip);
            self.bridge.set_status(status.clone());
            return Ok(status);
        }

        info!("syncing {start}..={tip}");
        self.bridge.begin_sync().await?;

        for (chunk_start, chunk_end) in chunk_ranges(start, tip, self.config.chunk_size) {
            let blocks = self.fetch_chunk(chunk_start, chunk_end).await?;
            if blocks.is_empty() {
                debug!("no blocks in {chunk_start}..={chunk_end}");
                continue;
            }
            let range = IngestRange {
                start_height: chunk_start,
                end_height: chunk_end,
                tip_height: tip,
            };
            self.bridge.ingest_blocks(blocks, range).await?;
        }

        let status = SyncStatus::ready_at(tip);
        self.bridge.set_status(status.clone());
        info!("sync complete at height {tip}");
        Ok(status)
    }

    async fn fetch_chunk(&self, start: u64, end: u64) -> SyncResult<Vec<CompactBlock>> {
        let attempts = self.config.fetch_attempts.max(1);
        let backoff = self.config.fetch_retry_backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.source.block_range(start, end).await {
                Ok(blocks) => return Ok(blocks),
                Err(e) if attempt < attempts => {
                    warn!("fetching {start}..={end} failed (attempt {attempt}/{attempts}): {e}");
                    if !backoff.is_zero() {
                        tokio::time::sleep(backoff).await;
                    }
                }
                Err(source) => {
                    return Err(SyncError::ChunkFetch {
                        start,
                        end,
                        attempts,
                        source,
                    });
                }
            }
        }
    }

    /// The full current snapshot. Never touches the network.
    pub async fn get_decrypted_snapshot(&self) -> SyncResult<DecryptedSnapshot> {
        self.bridge.get_decrypted_snapshot().await
    }

    /// Wipes the session back to idle. Safe to call repeatedly.
    pub async fn clear_session(&self) -> SyncResult<DecryptedSnapshot> {
        self.bridge.clear_session().await
    }

    pub fn status(&self) -> SyncStatus {
        self.bridge.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.bridge.subscribe_status()
    }

    pub fn subscribe_logs(&self) -> broadcast::Receiver<String> {
        self.bridge.subscribe_logs()
    }

    /// Stops the worker and any background health checks. Pending calls,
    /// including a run in progress, fail with `WorkerTerminated`.
    pub fn destroy(&self) {
        if let Some(monitor) = &self.health_monitor {
            monitor.abort();
        }
        self.bridge.destroy();
    }
}

impl Drop for ShieldedSync {
    fn drop(&mut self) {
        if let Some(monitor) = self.health_monitor.take() {
            monitor.abort();
        }
    }
}
