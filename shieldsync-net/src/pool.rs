//! Endpoint pool with health probes, active selection and failover.
//!
//! The pool owns one [`EndpointRuntimeState`] per candidate for its whole
//! lifetime. Probes and call failures mutate that state; concurrent callers
//! share it and races resolve last-write-wins. Unhealthy marks never expire on
//! their own: a candidate is only reconsidered when a full selection runs.

use crate::error::{NetError, NetResult};
use crate::response::parse_metadata;
use crate::transport::{ChainCall, ChainTransport};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use shieldsync_types::{ChainMetadata, Endpoint};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// An endpoint plus what the pool has learned about it.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointRuntimeState {
    pub endpoint: Endpoint,
    pub healthy: bool,
    pub last_error: Option<String>,
    pub last_latency: Option<Duration>,
    pub last_block_height: Option<u64>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl EndpointRuntimeState {
    fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            healthy: true,
            last_error: None,
            last_latency: None,
            last_block_height: None,
            last_checked_at: None,
        }
    }

    fn record_probe_success(&mut self, metadata: &ChainMetadata, latency: Duration) {
        self.healthy = true;
        self.last_error = None;
        self.last_latency = Some(latency);
        self.last_block_height = Some(metadata.block_height);
        self.last_checked_at = Some(Utc::now());
    }

    fn record_failure(&mut self, error: String) {
        self.healthy = false;
        self.last_error = Some(error);
        self.last_checked_at = Some(Utc::now());
    }

    /// Primary first, then fastest. Unmeasured latency sorts last.
    fn preference_key(&self) -> (bool, Duration) {
        (
            !self.endpoint.primary,
            self.last_latency.unwrap_or(Duration::MAX),
        )
    }
}

struct PoolState {
    candidates: Vec<EndpointRuntimeState>,
    active: Option<String>,
}

impl PoolState {
    fn find_mut(&mut self, id: &str) -> Option<&mut EndpointRuntimeState> {
        self.candidates.iter_mut().find(|c| c.endpoint.id == id)
    }

    fn active_endpoint(&self) -> Option<Endpoint> {
        let id = self.active.as_deref()?;
        self.candidates
            .iter()
            .find(|c| c.endpoint.id == id)
            .map(|c| c.endpoint.clone())
    }

    fn ranked_healthy<'a>(
        &'a self,
        exclude: &'a HashSet<String>,
    ) -> impl Iterator<Item = &'a EndpointRuntimeState> + 'a {
        let mut healthy: Vec<_> = self
            .candidates
            .iter()
            .filter(|c| c.healthy && !exclude.contains(&c.endpoint.id))
            .collect();
        healthy.sort_by_key(|c| c.preference_key());
        healthy.into_iter()
    }
}

/// Candidate endpoints, their health, and the active selection.
pub struct EndpointPool {
    transport: Arc<dyn ChainTransport>,
    state: RwLock<PoolState>,
    probe_timeout: Duration,
}

impl EndpointPool {
    pub fn new(
        endpoints: Vec<Endpoint>,
        transport: Arc<dyn ChainTransport>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            state: RwLock::new(PoolState {
                candidates: endpoints.into_iter().map(EndpointRuntimeState::new).collect(),
                active: None,
            }),
            probe_timeout,
        }
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.candidates.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn active_endpoint(&self) -> Option<Endpoint> {
        self.state.read().await.active_endpoint()
    }

    /// Point-in-time copy of every candidate's runtime state.
    pub async fn endpoint_states(&self) -> Vec<EndpointRuntimeState> {
        self.state.read().await.candidates.clone()
    }

    pub async fn mark_unhealthy(&self, id: &str, error: &NetError) {
        let mut state = self.state.write().await;
        if let Some(candidate) = state.find_mut(id) {
            candidate.record_failure(error.to_string());
        }
    }

    /// Probes every candidate concurrently and activates the best healthy one.
    pub async fn select_best_endpoint(&self, timeout: Duration) -> NetResult<Endpoint> {
        let endpoints: Vec<Endpoint> = {
            let state = self.state.read().await;
            state.candidates.iter().map(|c| c.endpoint.clone()).collect()
        };

        if endpoints.is_empty() {
            return Err(NetError::Exhausted("no candidate endpoints configured".to_string()));
        }

        let probes = endpoints.iter().map(|ep| self.probe(ep, timeout));
        let results = join_all(probes).await;

        let mut state = self.state.write().await;
        for (endpoint, result) in endpoints.iter().zip(results) {
            let Some(candidate) = state.find_mut(&endpoint.id) else {
                continue;
            };
            match result {
                Ok((metadata, latency)) => {
                    debug!(
                        "probe {} ok: height {} in {latency:?}",
                        endpoint.id, metadata.block_height
                    );
                    candidate.record_probe_success(&metadata, latency);
                }
                Err(e) => {
                    warn!("probe {} failed: {e}", endpoint.id);
                    candidate.record_failure(e.to_string());
                }
            }
        }

        let none = HashSet::new();
        let best = state.ranked_healthy(&none).next().map(|c| c.endpoint.clone());
        match best {
            Some(endpoint) => {
                if state.active.as_deref() != Some(endpoint.id.as_str()) {
                    info!("active endpoint -> {} ({})", endpoint.id, endpoint.url);
                }
                state.active = Some(endpoint.id.clone());
                Ok(endpoint)
            }
            None => {
                state.active = None;
                Err(NetError::Exhausted(format!(
                    "all {} candidates failed health checks",
                    state.candidates.len()
                )))
            }
        }
    }

    async fn probe(
        &self,
        endpoint: &Endpoint,
        timeout: Duration,
    ) -> NetResult<(ChainMetadata, Duration)> {
        let started = Instant::now();
        let call = self.transport.call(endpoint, &ChainCall::Metadata);
        let reply = tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| NetError::Timeout {
                endpoint: endpoint.id.clone(),
                after: timeout,
            })??;
        let latency = started.elapsed();
        let metadata = parse_metadata(&endpoint.id, &reply)?;
        Ok((metadata, latency))
    }

    /// Activates the best healthy candidate not in `tried`, if any.
    async fn switch_to_untried(&self, tried: &HashSet<String>) -> Option<Endpoint> {
        let mut state = self.state.write().await;
        let next = state.ranked_healthy(tried).next().map(|c| c.endpoint.clone())?;
        state.active = Some(next.id.clone());
        Some(next)
    }

    /// Runs `operation` against the active endpoint, failing over on error.
    ///
    /// Each candidate is tried at most once per call. When no untried healthy
    /// candidate remains, a full selection runs so previously unhealthy
    /// endpoints get another chance. The last operation error is returned
    /// once nothing usable is left.
    pub async fn with_failover<T, F, Fut>(&self, mut operation: F) -> NetResult<T>
    where
        F: FnMut(Endpoint) -> Fut,
        Fut: Future<Output = NetResult<T>>,
    {
        let mut current = match self.active_endpoint().await {
            Some(endpoint) => endpoint,
            None => self.select_best_endpoint(self.probe_timeout).await?,
        };
        let mut tried: HashSet<String> = HashSet::new();

        loop {
            tried.insert(current.id.clone());

            let err = match operation(current.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            warn!("call via {} failed: {err}", current.id);
            self.mark_unhealthy(&current.id, &err).await;

            if let Some(next) = self.switch_to_untried(&tried).await {
                info!("failing over from {} to {}", current.id, next.id);
                current = next;
                continue;
            }

            if tried.len() >= self.len().await {
                return Err(err);
            }

            if let Err(select_err) = self.select_best_endpoint(self.probe_timeout).await {
                debug!("reselection found nothing usable: {select_err}");
                return Err(err);
            }

            match self.switch_to_untried(&tried).await {
                Some(next) => {
                    info!("reselection recovered {}", next.id);
                    current = next;
                }
                None => return Err(err),
            }
        }
    }
}
