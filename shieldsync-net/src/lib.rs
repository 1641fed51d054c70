//! Block-data network client for shieldsync.
//!
//! Provides:
//! - An endpoint pool with concurrent health probes and active selection
//! - `with_failover`, which retries an operation across healthy candidates
//! - A pluggable [`ChainTransport`] with a reqwest-backed HTTP implementation
//! - [`NetworkClient`], the thin operation surface the sync engine calls

pub mod client;
pub mod config;
pub mod error;
pub mod http_transport;
pub mod pool;
pub mod response;
pub mod transport;

pub use client::NetworkClient;
pub use config::NetConfig;
pub use error::{NetError, NetResult};
pub use http_transport::HttpTransport;
pub use pool::{EndpointPool, EndpointRuntimeState};
pub use transport::{ChainCall, ChainTransport};
