use serde::{Deserialize, Serialize};

/// Condensed block: enough to drive a scan without full block contents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactBlock {
    pub height: u64,
    pub hash: String,
}

impl CompactBlock {
    pub fn new(height: u64, hash: impl Into<String>) -> Self {
        Self {
            height,
            hash: hash.into(),
        }
    }
}

/// Basic chain metadata reported by a block-data service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainMetadata {
    pub chain_name: String,
    pub block_height: u64,
    #[serde(default)]
    pub vendor: String,
}

/// A raw (still encrypted) transaction fetched by id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    pub txid: String,
    /// Hex-encoded transaction bytes.
    pub data: String,
    pub height: u64,
}
