//! Shared types for shieldsync.
//!
//! Everything here crosses a boundary: between the caller and the worker, or
//! between the network client and a remote block-data service. Field names
//! serialize in camelCase to match the wire shapes both sides agree on.

mod chain;
mod endpoint;
mod snapshot;
mod status;

pub use chain::{ChainMetadata, CompactBlock, RawTransaction};
pub use endpoint::{Endpoint, Network};
pub use snapshot::{Balances, DecryptedSnapshot, Transaction};
pub use status::{SyncStage, SyncStatus};
