//! Shielded block sync engine.
//!
//! The engine is split across two execution contexts that share no memory:
//!
//! - A **worker** thread owns the session state machine and the decrypted
//!   snapshot. It processes one request at a time, strictly in arrival order.
//! - The **caller** side talks to it through [`WorkerBridge`], which correlates
//!   replies by request id, enforces timeouts, and caches the status the
//!   worker pushes.
//!
//! [`ShieldedSync`] layers the incremental sync run on top: discover the tip,
//! chunk the range, fetch each chunk with retries, and feed it to the worker.

pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod protocol;
pub mod session;
pub mod worker;

pub use bridge::{WorkerBridge, WorkerReply};
pub use config::SyncConfig;
pub use engine::{DecryptionEngine, EngineError, PlaceholderEngine};
pub use error::{SyncError, SyncResult};
pub use orchestrator::{BlockSource, ShieldedSync, chunk_ranges};
pub use protocol::{
    ActionKind, ErrorCode, IngestRange, ReplyKind, RequestId, WorkerAction, WorkerMessage,
    WorkerRequest,
};
pub use session::SessionParams;
pub use worker::{SessionPhase, SessionWorker, WorkerHandle, compute_progress, spawn_worker};
