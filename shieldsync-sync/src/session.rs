//! Session start-up: the one place the viewing key enters the engine.

use crate::bridge::WorkerBridge;
use crate::config::SyncConfig;
use crate::engine::{DecryptionEngine, PlaceholderEngine};
use crate::error::{SyncError, SyncResult};
use crate::orchestrator::{BlockSource, ShieldedSync};
use shieldsync_net::{NetConfig, NetworkClient};
use shieldsync_types::Network;
use std::fmt;
use std::sync::Arc;
use tracing::info;
use zeroize::Zeroizing;

/// What the session owner hands over exactly once.
pub struct SessionParams {
    pub viewing_key: Zeroizing<String>,
    pub network: Network,
}

impl SessionParams {
    pub fn new(viewing_key: impl Into<String>, network: Network) -> Self {
        Self {
            viewing_key: Zeroizing::new(viewing_key.into()),
            network,
        }
    }
}

impl fmt::Debug for SessionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionParams")
            .field("viewing_key", &"[REDACTED]")
            .field("network", &self.network)
            .finish()
    }
}

impl ShieldedSync {
    /// Spawns a worker around `engine`, binds it to the network and loads the
    /// viewing key. The key is wiped once the worker has taken it.
    pub async fn start<E: DecryptionEngine>(
        params: SessionParams,
        engine: E,
        source: Arc<dyn BlockSource>,
        config: SyncConfig,
    ) -> SyncResult<Self> {
        let SessionParams {
            viewing_key,
            network,
        } = params;

        let bridge = WorkerBridge::spawn(engine, config.request_timeout())?;
        bridge.init(network).await?;
        bridge.set_viewing_key(viewing_key).await?;
        info!("shielded session started on {network}");

        Ok(Self::new(bridge, source, config))
    }

    /// Starts a session against the configured HTTP endpoints with the
    /// placeholder engine, plus the background health monitor when
    /// `net_config` asks for one.
    ///
    /// Every endpoint must serve the session's network.
    pub async fn connect(
        params: SessionParams,
        net_config: NetConfig,
        config: SyncConfig,
    ) -> SyncResult<Self> {
        if let Some(endpoint) = net_config
            .endpoints
            .iter()
            .find(|e| e.network != params.network)
        {
            return Err(SyncError::NetworkMismatch {
                session: params.network,
                endpoint: endpoint.id.clone(),
                endpoint_network: endpoint.network,
            });
        }

        let health_interval = net_config.health_check_interval();
        let client = Arc::new(NetworkClient::new(net_config)?);
        let source: Arc<dyn BlockSource> = client.clone();
        let session = Self::start(params, PlaceholderEngine::default(), source, config).await?;

        Ok(match health_interval {
            Some(interval) => session.with_health_monitor(client.spawn_health_monitor(interval)),
            None => session,
        })
    }
}
