//! Sync engine error types.

use crate::engine::EngineError;
use crate::protocol::ActionKind;
use shieldsync_net::NetError;
use shieldsync_types::Network;
use std::time::Duration;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors surfaced by the bridge, the worker and the orchestrator.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The worker answered with a reply that doesn't fit the request.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("{action} timed out after {after:?}")]
    Timeout { action: ActionKind, after: Duration },

    /// An action was invoked before the state it requires.
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("network error: {0}")]
    Network(#[source] NetError),

    #[error("no healthy endpoint available: {0}")]
    Exhausted(String),

    /// A configured endpoint serves a different chain than the session.
    #[error("endpoint {endpoint} serves {endpoint_network}, session is bound to {session}")]
    NetworkMismatch {
        session: Network,
        endpoint: String,
        endpoint_network: Network,
    },

    #[error("failed to fetch blocks {start}..={end} after {attempts} attempts: {source}")]
    ChunkFetch {
        start: u64,
        end: u64,
        attempts: u32,
        #[source]
        source: NetError,
    },

    /// The worker reported an unrecoverable failure.
    #[error("fatal worker error: {0}")]
    FatalWorker(String),

    #[error("worker error: {0}")]
    Worker(String),

    #[error("worker terminated")]
    WorkerTerminated,

    #[error("decryption engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("failed to start worker: {0}")]
    Spawn(#[from] std::io::Error),
}

impl From<NetError> for SyncError {
    fn from(err: NetError) -> Self {
        match err {
            NetError::Exhausted(reason) => SyncError::Exhausted(reason),
            other => SyncError::Network(other),
        }
    }
}

impl SyncError {
    /// Whether running the same sync again could plausibly succeed.
    ///
    /// Network trouble is worth a retry. Protocol, precondition and worker
    /// failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_)
                | SyncError::Exhausted(_)
                | SyncError::ChunkFetch { .. }
                | SyncError::Timeout { .. }
        )
    }

    pub fn is_exhausted(&self) -> bool {
        match self {
            SyncError::Exhausted(_) => true,
            SyncError::ChunkFetch { source, .. } => source.is_exhausted(),
            _ => false,
        }
    }
}
