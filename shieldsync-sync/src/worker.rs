//! Worker session state machine and the thread that hosts it.
//!
//! [`SessionWorker`] is a pure actor: it owns all session state and only
//! changes it inside [`SessionWorker::handle`], which turns one request into
//! the messages to send back. [`spawn_worker`] runs it on a dedicated thread
//! fed by a channel, so requests are handled one at a time in arrival order
//! and nothing but message payloads crosses the boundary.

use crate::engine::{DecryptionEngine, EngineError};
use crate::protocol::{
    ActionKind, ErrorCode, IngestRange, RequestId, WorkerAction, WorkerMessage, WorkerRequest,
};
use shieldsync_types::{CompactBlock, DecryptedSnapshot, Network, SyncStage, SyncStatus};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use zeroize::Zeroizing;

/// Percentage of `[start, target]` covered by `latest`, rounded.
///
/// Returns 0 when any height is unknown or the range is empty.
pub fn compute_progress(start: Option<u64>, latest: Option<u64>, target: Option<u64>) -> u8 {
    let (Some(start), Some(latest), Some(target)) = (start, latest, target) else {
        return 0;
    };
    if target <= start {
        return 0;
    }
    let ratio = latest.saturating_sub(start) as f64 / (target - start) as f64;
    (ratio.clamp(0.0, 1.0) * 100.0).round() as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Initialized,
    KeyConfigured,
}

/// Why a request failed. Becomes an `error` reply.
struct Rejection {
    code: ErrorCode,
    message: String,
    fatal: bool,
}

impl Rejection {
    fn precondition(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Precondition,
            message: message.into(),
            fatal: false,
        }
    }
}

enum Reply {
    Ack,
    Snapshot,
}

pub struct SessionWorker<E> {
    engine: E,
    network: Option<Network>,
    /// Only the fact that a key was accepted. The key itself is never kept.
    key_configured: bool,
    snapshot: DecryptedSnapshot,
    status: SyncStatus,
    sync_start_height: Option<u64>,
    sync_target_height: Option<u64>,
    scanned_height: Option<u64>,
}

impl<E: DecryptionEngine> SessionWorker<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            network: None,
            key_configured: false,
            snapshot: DecryptedSnapshot::default(),
            status: SyncStatus::idle(),
            sync_start_height: None,
            sync_target_height: None,
            scanned_height: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        match (self.network, self.key_configured) {
            (None, _) => SessionPhase::Uninitialized,
            (Some(_), false) => SessionPhase::Initialized,
            (Some(_), true) => SessionPhase::KeyConfigured,
        }
    }

    pub fn network(&self) -> Option<Network> {
        self.network
    }

    pub fn status(&self) -> &SyncStatus {
        &self.status
    }

    pub fn snapshot(&self) -> &DecryptedSnapshot {
        &self.snapshot
    }

    /// Handles one request and returns every message it produces, in order.
    ///
    /// Status pushes and logs come first, the correlated reply last.
    pub fn handle(&mut self, request: WorkerRequest) -> Vec<WorkerMessage> {
        let WorkerRequest { request_id, action } = request;
        let kind = action.kind();
        let mut out = Vec::new();

        let result = match action {
            WorkerAction::Init { network } => self.init(network, &mut out),
            WorkerAction::SetViewingKey { viewing_key } => {
                self.set_viewing_key(viewing_key, &mut out)
            }
            WorkerAction::Sync => self.begin_sync(&mut out),
            WorkerAction::IngestBlocks { blocks, range } => self.ingest(&blocks, range, &mut out),
            WorkerAction::GetDecryptedSnapshot => Ok(Reply::Snapshot),
            WorkerAction::ClearSession => self.clear(&mut out),
        };

        out.push(self.reply(request_id, kind, result));
        out
    }

    fn reply(
        &self,
        request_id: RequestId,
        action: ActionKind,
        result: Result<Reply, Rejection>,
    ) -> WorkerMessage {
        match result {
            Ok(Reply::Ack) => WorkerMessage::Ok { request_id, action },
            Ok(Reply::Snapshot) => WorkerMessage::Snapshot {
                request_id,
                payload: self.snapshot.clone(),
            },
            Err(rejection) => WorkerMessage::Error {
                message: rejection.message,
                request_id: Some(request_id),
                fatal: rejection.fatal,
                code: Some(rejection.code),
            },
        }
    }

    fn push_status(&self, out: &mut Vec<WorkerMessage>) {
        out.push(WorkerMessage::SyncStatus {
            payload: self.status.clone(),
        });
    }

    fn init(&mut self, network: Network, out: &mut Vec<WorkerMessage>) -> Result<Reply, Rejection> {
        match self.network {
            Some(current) if current == network => {
                out.push(WorkerMessage::log(format!("already initialized for {network}")));
            }
            Some(current) => {
                self.reset();
                self.network = Some(network);
                self.push_status(out);
                out.push(WorkerMessage::log(format!(
                    "session reset: network changed from {current} to {network}"
                )));
            }
            None => {
                self.network = Some(network);
                out.push(WorkerMessage::log(format!("initialized for {network}")));
            }
        }
        Ok(Reply::Ack)
    }

    fn set_viewing_key(
        &mut self,
        viewing_key: Zeroizing<String>,
        out: &mut Vec<WorkerMessage>,
    ) -> Result<Reply, Rejection> {
        let Some(network) = self.network else {
            return Err(Rejection::precondition("setViewingKey requires init"));
        };

        // `viewing_key` is wiped when it drops at the end of this call.
        match self.engine.accept_viewing_key(network, &viewing_key) {
            Ok(()) => {
                self.key_configured = true;
                out.push(WorkerMessage::log("viewing key configured"));
                Ok(Reply::Ack)
            }
            Err(e) => Err(Rejection {
                code: ErrorCode::InvalidKey,
                message: e.reason().to_string(),
                fatal: false,
            }),
        }
    }

    fn require_sync_ready(&self, action: ActionKind) -> Result<(), Rejection> {
        match self.phase() {
            SessionPhase::KeyConfigured => Ok(()),
            SessionPhase::Initialized => Err(Rejection::precondition(format!(
                "{action} requires a viewing key"
            ))),
            SessionPhase::Uninitialized => {
                Err(Rejection::precondition(format!("{action} requires init")))
            }
        }
    }

    fn begin_sync(&mut self, out: &mut Vec<WorkerMessage>) -> Result<Reply, Rejection> {
        self.require_sync_ready(ActionKind::Sync)?;

        self.sync_start_height = None;
        self.sync_target_height = None;
        self.scanned_height = None;
        self.status = SyncStatus {
            stage: SyncStage::Syncing,
            progress: 0,
            error_message: None,
            ..self.status.clone()
        };
        self.push_status(out);
        Ok(Reply::Ack)
    }

    fn ingest(
        &mut self,
        blocks: &[CompactBlock],
        range: IngestRange,
        out: &mut Vec<WorkerMessage>,
    ) -> Result<Reply, Rejection> {
        self.require_sync_ready(ActionKind::IngestBlocks)?;

        if let Err(e) = self.engine.scan_blocks(blocks, &mut self.snapshot) {
            return Err(self.fail(e, out));
        }

        if self.sync_start_height.is_none() {
            self.sync_start_height = Some(range.start_height);
        }
        self.sync_target_height = Some(range.tip_height);
        self.scanned_height = Some(range.end_height);

        let caught_up = range.end_height >= range.tip_height;
        let progress = if caught_up {
            100
        } else {
            compute_progress(
                self.sync_start_height,
                self.scanned_height,
                self.sync_target_height,
            )
        };

        self.status = SyncStatus {
            stage: if caught_up {
                SyncStage::Ready
            } else {
                SyncStage::Scanning
            },
            progress,
            latest_scanned_height: Some(range.end_height),
            latest_chain_height: Some(range.tip_height),
            error_message: None,
        };
        self.push_status(out);
        out.push(WorkerMessage::log(format!(
            "scanned {} blocks {}..={} ({progress}%)",
            blocks.len(),
            range.start_height,
            range.end_height
        )));
        Ok(Reply::Snapshot)
    }

    /// Puts the session into the error stage after an engine failure.
    fn fail(&mut self, err: EngineError, out: &mut Vec<WorkerMessage>) -> Rejection {
        let message = err.to_string();
        self.status = self.status.clone().into_error(message.clone());
        self.push_status(out);
        Rejection {
            code: ErrorCode::Engine,
            message,
            fatal: true,
        }
    }

    fn clear(&mut self, out: &mut Vec<WorkerMessage>) -> Result<Reply, Rejection> {
        self.reset();
        self.push_status(out);
        out.push(WorkerMessage::log("session cleared"));
        Ok(Reply::Snapshot)
    }

    fn reset(&mut self) {
        self.engine.reset();
        self.network = None;
        self.key_configured = false;
        self.snapshot.clear();
        self.status = SyncStatus::idle();
        self.sync_start_height = None;
        self.sync_target_height = None;
        self.scanned_height = None;
    }
}

/// Caller-side ends of a running worker.
pub struct WorkerHandle {
    pub requests: mpsc::UnboundedSender<WorkerRequest>,
    pub messages: mpsc::UnboundedReceiver<WorkerMessage>,
    pub thread: thread::JoinHandle<()>,
}

/// Starts `engine` inside a session worker on its own thread.
///
/// The worker stops when the request sender is dropped, when the message
/// receiver goes away, or after it panics. A panic is reported as an
/// uncorrelated fatal error before the thread exits.
pub fn spawn_worker<E: DecryptionEngine>(engine: E) -> std::io::Result<WorkerHandle> {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (message_tx, message_rx) = mpsc::unbounded_channel();

    let thread = thread::Builder::new()
        .name("shieldsync-worker".to_string())
        .spawn(move || run_worker(SessionWorker::new(engine), request_rx, message_tx))?;

    Ok(WorkerHandle {
        requests: request_tx,
        messages: message_rx,
        thread,
    })
}

fn run_worker<E: DecryptionEngine>(
    mut worker: SessionWorker<E>,
    mut requests: mpsc::UnboundedReceiver<WorkerRequest>,
    messages: mpsc::UnboundedSender<WorkerMessage>,
) {
    info!("session worker started");

    while let Some(request) = requests.blocking_recv() {
        let kind = request.action.kind();
        debug!("worker handling {kind} ({})", request.request_id);

        match catch_unwind(AssertUnwindSafe(|| worker.handle(request))) {
            Ok(replies) => {
                for reply in replies {
                    if messages.send(reply).is_err() {
                        debug!("bridge gone, stopping worker");
                        return;
                    }
                }
            }
            Err(panic) => {
                let reason = panic_reason(panic.as_ref());
                error!("session worker crashed during {kind}: {reason}");
                let _ = messages.send(WorkerMessage::fatal(format!(
                    "worker crashed during {kind}: {reason}"
                )));
                return;
            }
        }
    }

    info!("session worker stopped");
}

fn panic_reason(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
