//! HTTP/JSON transport for block-data services.
//!
//! Routes are relative to the endpoint URL:
//! `GET /info`, `GET /blocks/latest`, `GET /blocks?start=&end=`, `GET /tx/{txid}`.
//! Any non-2xx status is a transport failure so the pool can fail over.

use crate::error::{NetError, NetResult};
use crate::transport::{ChainCall, ChainTransport};
use async_trait::async_trait;
use reqwest::Client;
use shieldsync_types::Endpoint;
use std::time::Duration;
use tracing::debug;

/// reqwest-backed [`ChainTransport`].
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> NetResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    fn url_for(endpoint: &Endpoint, call: &ChainCall) -> String {
        let base = endpoint.url.trim_end_matches('/');
        match call {
            ChainCall::Metadata => format!("{base}/info"),
            ChainCall::LatestBlock => format!("{base}/blocks/latest"),
            ChainCall::BlockRange { .. } => format!("{base}/blocks"),
            ChainCall::Transaction { txid } => {
                format!("{base}/tx/{}", urlencoding::encode(txid))
            }
        }
    }
}

#[async_trait]
impl ChainTransport for HttpTransport {
    async fn call(&self, endpoint: &Endpoint, call: &ChainCall) -> NetResult<serde_json::Value> {
        let url = Self::url_for(endpoint, call);
        debug!("GET {url} ({})", call.name());

        let mut request = self.client.get(&url);
        if let ChainCall::BlockRange { start, end } = call {
            request = request.query(&[("start", start), ("end", end)]);
        }

        let resp = request
            .send()
            .await?
            .error_for_status()
            .map_err(|e| NetError::Transport(format!("{} on {}: {e}", call.name(), endpoint.id)))?;

        Ok(resp.json().await?)
    }
}
