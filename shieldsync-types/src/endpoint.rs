use serde::{Deserialize, Serialize};
use std::fmt;

/// Chain a session is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate block-data service address. Immutable once configured.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub id: String,
    pub url: String,
    pub network: Network,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Primary endpoints win selection ties regardless of latency.
    #[serde(default)]
    pub primary: bool,
}

impl Endpoint {
    pub fn new(id: impl Into<String>, url: impl Into<String>, network: Network) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            network,
            region: None,
            primary: false,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }
}
