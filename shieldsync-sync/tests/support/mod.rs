//! Fakes shared by the sync integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use shieldsync_net::{NetError, NetResult};
use shieldsync_sync::{
    DecryptionEngine, EngineError, IngestRange, SessionWorker, WorkerAction, WorkerBridge,
    WorkerMessage, WorkerRequest,
};
use shieldsync_types::{
    Balances, CompactBlock, DecryptedSnapshot, Network, SyncStage, Transaction,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub fn blocks(start: u64, end: u64) -> Vec<CompactBlock> {
    (start..=end)
        .map(|h| CompactBlock::new(h, format!("hash-{h}")))
        .collect()
}

/// Engine that "finds" a 1000-unit note in every block whose height is in
/// `hits`, and fails scanning any chunk containing `fail_at`.
#[derive(Default)]
pub struct NoteEngine {
    pub hits: HashSet<u64>,
    pub fail_at: Option<u64>,
    pub panic_on_scan: bool,
    pub loaded: bool,
}

impl NoteEngine {
    pub fn with_hits(hits: impl IntoIterator<Item = u64>) -> Self {
        Self {
            hits: hits.into_iter().collect(),
            ..Self::default()
        }
    }
}

impl DecryptionEngine for NoteEngine {
    fn accept_viewing_key(&mut self, _network: Network, key: &str) -> Result<(), EngineError> {
        if key == "bad-key" {
            return Err(EngineError::InvalidKey("unrecognised key encoding".into()));
        }
        self.loaded = true;
        Ok(())
    }

    fn scan_blocks(
        &mut self,
        blocks: &[CompactBlock],
        snapshot: &mut DecryptedSnapshot,
    ) -> Result<(), EngineError> {
        if self.panic_on_scan {
            panic!("scanner blew up");
        }
        for block in blocks {
            if Some(block.height) == self.fail_at {
                return Err(EngineError::Scan(format!("corrupt block {}", block.height)));
            }
            if self.hits.contains(&block.height) {
                snapshot.transactions.push(Transaction {
                    txid: block.hash.clone(),
                    height: block.height,
                    amount: 1000,
                    memo: None,
                    timestamp: None,
                });
                let balances = snapshot.balances.get_or_insert(Balances::default());
                balances.confirmed += 1000;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.loaded = false;
    }
}

/// Scripted block source.
#[derive(Default)]
pub struct FakeSource {
    tip: Mutex<Option<u64>>,
    failures: Mutex<HashMap<u64, u32>>,
    always_fail: Mutex<HashSet<u64>>,
    empty: Mutex<HashSet<u64>>,
    range_calls: Mutex<Vec<(u64, u64)>>,
    tip_calls: Mutex<u32>,
}

impl FakeSource {
    pub fn with_tip(tip: u64) -> Self {
        let source = Self::default();
        *source.tip.lock().unwrap() = Some(tip);
        source
    }

    /// Tip lookups fail.
    pub fn unreachable() -> Self {
        Self::default()
    }

    /// The chunk starting at `start` fails `times` times before succeeding.
    pub fn fail_chunk(&self, start: u64, times: u32) {
        self.failures.lock().unwrap().insert(start, times);
    }

    pub fn always_fail_chunk(&self, start: u64) {
        self.always_fail.lock().unwrap().insert(start);
    }

    pub fn empty_chunk(&self, start: u64) {
        self.empty.lock().unwrap().insert(start);
    }

    pub fn range_calls(&self) -> Vec<(u64, u64)> {
        self.range_calls.lock().unwrap().clone()
    }

    pub fn tip_calls(&self) -> u32 {
        *self.tip_calls.lock().unwrap()
    }
}

#[async_trait]
impl shieldsync_sync::BlockSource for FakeSource {
    async fn latest_height(&self) -> NetResult<u64> {
        *self.tip_calls.lock().unwrap() += 1;
        let tip = *self.tip.lock().unwrap();
        tip.ok_or_else(|| NetError::Exhausted("all 3 candidates failed health checks".into()))
    }

    async fn block_range(&self, start: u64, end: u64) -> NetResult<Vec<CompactBlock>> {
        self.range_calls.lock().unwrap().push((start, end));

        if self.always_fail.lock().unwrap().contains(&start) {
            return Err(NetError::Transport(format!("range {start} unavailable")));
        }
        if let Some(remaining) = self.failures.lock().unwrap().get_mut(&start)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(NetError::Transport(format!("range {start} flaked")));
        }
        if self.empty.lock().unwrap().contains(&start) {
            return Ok(Vec::new());
        }
        Ok(blocks(start, end))
    }
}

/// Test-controlled worker end: the test reads requests and writes messages.
pub struct ScriptedWorker {
    pub requests: mpsc::UnboundedReceiver<WorkerRequest>,
    pub messages: mpsc::UnboundedSender<WorkerMessage>,
}

impl ScriptedWorker {
    pub async fn next_request(&mut self) -> WorkerRequest {
        self.requests.recv().await.expect("bridge closed")
    }

    pub fn send(&self, message: WorkerMessage) {
        self.messages.send(message).expect("bridge gone");
    }
}

pub fn scripted_bridge(timeout: Duration) -> (WorkerBridge, ScriptedWorker) {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (message_tx, message_rx) = mpsc::unbounded_channel();
    let bridge = WorkerBridge::from_channels(request_tx, message_rx, timeout);
    (
        bridge,
        ScriptedWorker {
            requests: request_rx,
            messages: message_tx,
        },
    )
}

/// What a recording worker saw and said.
#[derive(Default)]
pub struct Recording {
    pub ingests: Vec<IngestRange>,
    pub pushed_progress: Vec<u8>,
}

/// Runs a real `SessionWorker` on a tokio task, recording ingest ranges and
/// the progress of every status push.
pub fn recording_bridge<E: DecryptionEngine>(
    engine: E,
    timeout: Duration,
) -> (WorkerBridge, Arc<Mutex<Recording>>) {
    let (request_tx, mut request_rx) = mpsc::unbounded_channel::<WorkerRequest>();
    let (message_tx, message_rx) = mpsc::unbounded_channel();
    let recording = Arc::new(Mutex::new(Recording::default()));

    let log = Arc::clone(&recording);
    tokio::spawn(async move {
        let mut worker = SessionWorker::new(engine);
        while let Some(request) = request_rx.recv().await {
            if let WorkerAction::IngestBlocks { range, .. } = &request.action {
                log.lock().unwrap().ingests.push(*range);
            }
            for message in worker.handle(request) {
                if let WorkerMessage::SyncStatus { payload } = &message
                    && matches!(payload.stage, SyncStage::Scanning | SyncStage::Ready)
                {
                    log.lock().unwrap().pushed_progress.push(payload.progress);
                }
                if message_tx.send(message).is_err() {
                    return;
                }
            }
        }
    });

    (
        WorkerBridge::from_channels(request_tx, message_rx, timeout),
        recording,
    )
}
