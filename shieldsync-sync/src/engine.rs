//! Decryption engine contract.
//!
//! The worker drives an engine but never looks inside it. An engine sees the
//! viewing key exactly once, folds scanned blocks into the snapshot, and can
//! be reset when the session is cleared.

use shieldsync_types::{CompactBlock, DecryptedSnapshot, Network};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid viewing key: {0}")]
    InvalidKey(String),

    #[error("block scan failed: {0}")]
    Scan(String),
}

impl EngineError {
    /// The detail without the category prefix.
    pub fn reason(&self) -> &str {
        match self {
            EngineError::InvalidKey(reason) | EngineError::Scan(reason) => reason,
        }
    }
}

pub trait DecryptionEngine: Send + 'static {
    /// Derives whatever the engine needs from the key. The caller wipes the
    /// key after this returns, so implementations must not keep a copy.
    fn accept_viewing_key(&mut self, network: Network, viewing_key: &str)
    -> Result<(), EngineError>;

    /// Trial-decrypts `blocks`, adding anything found to `snapshot`.
    fn scan_blocks(
        &mut self,
        blocks: &[CompactBlock],
        snapshot: &mut DecryptedSnapshot,
    ) -> Result<(), EngineError>;

    /// Forgets all derived key material.
    fn reset(&mut self) {}
}

/// Stand-in engine: checks the key is non-blank and finds nothing.
#[derive(Debug, Default)]
pub struct PlaceholderEngine {
    network: Option<Network>,
}

impl DecryptionEngine for PlaceholderEngine {
    fn accept_viewing_key(
        &mut self,
        network: Network,
        viewing_key: &str,
    ) -> Result<(), EngineError> {
        if viewing_key.trim().is_empty() {
            return Err(EngineError::InvalidKey("viewing key is empty".to_string()));
        }
        self.network = Some(network);
        Ok(())
    }

    fn scan_blocks(
        &mut self,
        _blocks: &[CompactBlock],
        _snapshot: &mut DecryptedSnapshot,
    ) -> Result<(), EngineError> {
        if self.network.is_none() {
            return Err(EngineError::Scan("no viewing key loaded".to_string()));
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.network = None;
    }
}
