//! Network client configuration.

use crate::error::{NetError, NetResult};
use serde::{Deserialize, Serialize};
use shieldsync_types::{Endpoint, Network};
use std::time::Duration;

/// Configuration for the endpoint pool and its transport.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetConfig {
    /// Candidate block-data services.
    pub endpoints: Vec<Endpoint>,

    /// Upper bound on a single health probe (milliseconds).
    pub probe_timeout_ms: u64,

    /// Per-request HTTP timeout (seconds).
    pub request_timeout_secs: u64,

    /// Re-run endpoint selection on this interval (seconds). `None` leaves
    /// unhealthy endpoints parked until a failover exhausts the rest.
    #[serde(default)]
    pub health_check_interval_secs: Option<u64>,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self::for_network(Network::Mainnet)
    }
}

impl NetConfig {
    /// Built-in candidate list for a network.
    pub fn for_network(network: Network) -> Self {
        let endpoints = match network {
            Network::Mainnet => vec![
                Endpoint::new("us-east", "https://us-east.shieldsync.network", network)
                    .with_region("us")
                    .primary(),
                Endpoint::new("eu-central", "https://eu-central.shieldsync.network", network)
                    .with_region("eu"),
                Endpoint::new("ap-south", "https://ap-south.shieldsync.network", network)
                    .with_region("ap"),
            ],
            Network::Testnet => vec![
                Endpoint::new("testnet", "https://testnet.shieldsync.network", network).primary(),
            ],
        };

        Self {
            endpoints,
            probe_timeout_ms: 5_000,
            request_timeout_secs: 30,
            health_check_interval_secs: None,
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn health_check_interval(&self) -> Option<Duration> {
        self.health_check_interval_secs.map(Duration::from_secs)
    }

    /// Rejects settings the pool and the health monitor can't run with.
    pub fn validate(&self) -> NetResult<()> {
        if self.endpoints.is_empty() {
            return Err(NetError::Config("no candidate endpoints".to_string()));
        }
        if self.probe_timeout_ms == 0 {
            return Err(NetError::Config("probe_timeout_ms must be positive".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(NetError::Config(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        if self.health_check_interval_secs == Some(0) {
            return Err(NetError::Config(
                "health_check_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
