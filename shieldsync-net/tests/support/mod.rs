//! Scriptable in-memory transport for pool and client tests.

#![allow(dead_code)]

use async_trait::async_trait;
use shieldsync_net::{ChainCall, ChainTransport, NetError, NetResult};
use shieldsync_types::{Endpoint, Network};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Probe {
    pub healthy: bool,
    pub latency: Duration,
    pub height: u64,
}

impl Probe {
    pub fn ok(latency_ms: u64) -> Self {
        Self {
            healthy: true,
            latency: Duration::from_millis(latency_ms),
            height: 2_000_000,
        }
    }

    pub fn down() -> Self {
        Self {
            healthy: false,
            latency: Duration::ZERO,
            height: 0,
        }
    }
}

/// Per-endpoint scripted behaviour. Unknown endpoints fail every call.
#[derive(Default)]
pub struct FakeTransport {
    probes: Mutex<HashMap<String, Probe>>,
    failing_calls: Mutex<HashSet<String>>,
    replies: Mutex<HashMap<&'static str, serde_json::Value>>,
    log: Mutex<Vec<(String, ChainCall)>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_probe(&self, id: &str, probe: Probe) {
        self.probes.lock().unwrap().insert(id.to_string(), probe);
    }

    /// Non-metadata calls to `id` fail.
    pub fn fail_calls(&self, id: &str) {
        self.failing_calls.lock().unwrap().insert(id.to_string());
    }

    /// Canned JSON for a call kind (see `ChainCall::name`).
    pub fn set_reply(&self, call: &'static str, reply: serde_json::Value) {
        self.replies.lock().unwrap().insert(call, reply);
    }

    pub fn calls(&self) -> Vec<(String, ChainCall)> {
        self.log.lock().unwrap().clone()
    }

    pub fn calls_of(&self, kind: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(_, call)| call.name() == kind)
            .map(|(id, _)| id)
            .collect()
    }
}

#[async_trait]
impl ChainTransport for FakeTransport {
    async fn call(&self, endpoint: &Endpoint, call: &ChainCall) -> NetResult<serde_json::Value> {
        self.log
            .lock()
            .unwrap()
            .push((endpoint.id.clone(), call.clone()));

        if let ChainCall::Metadata = call {
            let probe = self.probes.lock().unwrap().get(&endpoint.id).cloned();
            let Some(probe) = probe else {
                return Err(NetError::Transport(format!("{} unreachable", endpoint.id)));
            };
            tokio::time::sleep(probe.latency).await;
            if !probe.healthy {
                return Err(NetError::Transport(format!("{} unreachable", endpoint.id)));
            }
            return Ok(serde_json::json!({
                "chainName": "main",
                "blockHeight": probe.height,
                "vendor": "fake"
            }));
        }

        if self.failing_calls.lock().unwrap().contains(&endpoint.id) {
            return Err(NetError::Transport(format!("{} failed {}", endpoint.id, call.name())));
        }

        self.replies
            .lock()
            .unwrap()
            .get(call.name())
            .cloned()
            .ok_or_else(|| NetError::Transport(format!("no reply scripted for {}", call.name())))
    }
}

pub fn endpoint(id: &str) -> Endpoint {
    Endpoint::new(id, format!("https://{id}.test"), Network::Mainnet)
}
