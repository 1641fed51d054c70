//! Caller-side proxy for the session worker.
//!
//! Every outbound request gets a fresh id and a pending entry holding a
//! oneshot sender. A dispatcher task drains the worker's messages: correlated
//! replies settle their pending entry exactly once, unmatched ones are counted
//! and dropped, and unsolicited pushes update the cached status or fan out to
//! log subscribers.

use crate::engine::{DecryptionEngine, EngineError};
use crate::error::{SyncError, SyncResult};
use crate::protocol::{
    ActionKind, ErrorCode, IngestRange, ReplyKind, RequestId, WorkerAction, WorkerMessage,
    WorkerRequest,
};
use crate::worker::spawn_worker;
use shieldsync_types::{CompactBlock, DecryptedSnapshot, Network, SyncStage, SyncStatus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

const LOG_CHANNEL_CAPACITY: usize = 256;

/// A successful, correlated worker reply.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerReply {
    Ack(ActionKind),
    Snapshot(DecryptedSnapshot),
}

impl WorkerReply {
    fn kind(&self) -> ReplyKind {
        match self {
            WorkerReply::Ack(_) => ReplyKind::Ok,
            WorkerReply::Snapshot(_) => ReplyKind::Snapshot,
        }
    }
}

struct PendingRequest {
    action: ActionKind,
    reply_tx: oneshot::Sender<SyncResult<WorkerReply>>,
}

/// State shared between the bridge and its dispatcher task.
struct Shared {
    pending: Mutex<HashMap<RequestId, PendingRequest>>,
    status: watch::Sender<SyncStatus>,
    logs: broadcast::Sender<String>,
    discarded: AtomicU64,
    terminated: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn route(&self, message: WorkerMessage) {
        match message {
            WorkerMessage::SyncStatus { payload } => {
                self.status.send_replace(payload);
            }
            WorkerMessage::Log { message } => {
                debug!(target: "shieldsync::worker", "{message}");
                let _ = self.logs.send(message);
            }
            WorkerMessage::Ok { request_id, action } => {
                self.settle(&request_id, Ok(WorkerReply::Ack(action)));
            }
            WorkerMessage::Snapshot {
                request_id,
                payload,
            } => {
                self.settle(&request_id, Ok(WorkerReply::Snapshot(payload)));
            }
            WorkerMessage::Error {
                message,
                request_id,
                fatal,
                code,
            } => {
                if fatal {
                    error!("worker reported fatal error: {message}");
                    self.force_error(&message);
                }
                match request_id {
                    Some(id) => self.settle(&id, Err(worker_error(code, fatal, message))),
                    None if !fatal => warn!("worker error: {message}"),
                    None => {}
                }
            }
        }
    }

    fn settle(&self, request_id: &str, result: SyncResult<WorkerReply>) {
        let Some(pending) = lock(&self.pending).remove(request_id) else {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            warn!("discarding reply for unknown request {request_id}");
            return;
        };
        let result = result.and_then(|reply| check_reply(pending.action, reply));
        // The caller may have stopped waiting; nothing left to do then.
        let _ = pending.reply_tx.send(result);
    }

    fn force_error(&self, message: &str) {
        self.status.send_modify(|status| {
            status.stage = SyncStage::Error;
            status.error_message = Some(message.to_string());
        });
    }

    /// Rejects every pending request with `WorkerTerminated`.
    fn reject_all(&self) -> usize {
        let drained: Vec<_> = lock(&self.pending).drain().collect();
        let count = drained.len();
        for (_, pending) in drained {
            let _ = pending.reply_tx.send(Err(SyncError::WorkerTerminated));
        }
        count
    }

    fn on_worker_exit(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        let rejected = self.reject_all();
        error!("session worker exited unexpectedly, rejected {rejected} pending requests");
        if !self.status.borrow().is_error() {
            self.force_error("worker terminated unexpectedly");
        }
    }
}

fn worker_error(code: Option<ErrorCode>, fatal: bool, message: String) -> SyncError {
    match code {
        Some(ErrorCode::Precondition) => SyncError::Precondition(message),
        Some(ErrorCode::InvalidKey) => SyncError::Engine(EngineError::InvalidKey(message)),
        _ if fatal => SyncError::FatalWorker(message),
        _ => SyncError::Worker(message),
    }
}

fn check_reply(action: ActionKind, reply: WorkerReply) -> SyncResult<WorkerReply> {
    if reply.kind() != action.expected_reply() {
        return Err(SyncError::Protocol(format!(
            "{action} expected a {:?} reply, got {:?}",
            action.expected_reply(),
            reply.kind()
        )));
    }
    if let WorkerReply::Ack(echoed) = &reply
        && *echoed != action
    {
        return Err(SyncError::Protocol(format!(
            "{action} was acknowledged as {echoed}"
        )));
    }
    Ok(reply)
}

/// Owns the worker connection and exposes the typed operation set.
pub struct WorkerBridge {
    requests: Mutex<Option<mpsc::UnboundedSender<WorkerRequest>>>,
    shared: Arc<Shared>,
    dispatcher: JoinHandle<()>,
    request_timeout: Duration,
}

impl WorkerBridge {
    /// Starts a worker thread around `engine` and connects to it.
    pub fn spawn<E: DecryptionEngine>(engine: E, request_timeout: Duration) -> SyncResult<Self> {
        let handle = spawn_worker(engine)?;
        // The thread ends on its own once the request channel closes.
        drop(handle.thread);
        Ok(Self::from_channels(
            handle.requests,
            handle.messages,
            request_timeout,
        ))
    }

    /// Connects to a worker reachable through the given channels.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_channels(
        requests: mpsc::UnboundedSender<WorkerRequest>,
        mut messages: mpsc::UnboundedReceiver<WorkerMessage>,
        request_timeout: Duration,
    ) -> Self {
        let (status, _) = watch::channel(SyncStatus::idle());
        let (logs, _) = broadcast::channel(LOG_CHANNEL_CAPACITY);
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            status,
            logs,
            discarded: AtomicU64::new(0),
            terminated: AtomicBool::new(false),
        });

        let dispatcher = tokio::spawn({
            let shared = Arc::clone(&shared);
            async move {
                while let Some(message) = messages.recv().await {
                    shared.route(message);
                }
                shared.on_worker_exit();
            }
        });

        Self {
            requests: Mutex::new(Some(requests)),
            shared,
            dispatcher,
            request_timeout,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Sends `action` and waits for its correlated reply.
    pub async fn request(&self, action: WorkerAction) -> SyncResult<WorkerReply> {
        let kind = action.kind();
        let request_id = Uuid::new_v4().to_string();
        let (reply_tx, reply_rx) = oneshot::channel();

        {
            let requests = lock(&self.requests);
            let Some(sender) = requests.as_ref() else {
                return Err(SyncError::WorkerTerminated);
            };
            if self.shared.terminated.load(Ordering::SeqCst) {
                return Err(SyncError::WorkerTerminated);
            }

            lock(&self.shared.pending).insert(
                request_id.clone(),
                PendingRequest {
                    action: kind,
                    reply_tx,
                },
            );
            // The worker may have exited between the check above and the
            // insert, after its pending entries were already drained.
            if self.shared.terminated.load(Ordering::SeqCst) {
                lock(&self.shared.pending).remove(&request_id);
                return Err(SyncError::WorkerTerminated);
            }
            if sender
                .send(WorkerRequest::new(request_id.clone(), action))
                .is_err()
            {
                lock(&self.shared.pending).remove(&request_id);
                return Err(SyncError::WorkerTerminated);
            }
        }
        debug!("sent {kind} ({request_id})");

        match tokio::time::timeout(self.request_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SyncError::WorkerTerminated),
            Err(_) => {
                lock(&self.shared.pending).remove(&request_id);
                warn!("{kind} ({request_id}) timed out after {:?}", self.request_timeout);
                Err(SyncError::Timeout {
                    action: kind,
                    after: self.request_timeout,
                })
            }
        }
    }

    async fn expect_ack(&self, action: WorkerAction) -> SyncResult<()> {
        match self.request(action).await? {
            WorkerReply::Ack(_) => Ok(()),
            WorkerReply::Snapshot(_) => Err(SyncError::Protocol("expected an ok reply".into())),
        }
    }

    async fn expect_snapshot(&self, action: WorkerAction) -> SyncResult<DecryptedSnapshot> {
        match self.request(action).await? {
            WorkerReply::Snapshot(snapshot) => Ok(snapshot),
            WorkerReply::Ack(_) => Err(SyncError::Protocol("expected a snapshot reply".into())),
        }
    }

    pub async fn init(&self, network: Network) -> SyncResult<()> {
        self.expect_ack(WorkerAction::Init { network }).await
    }

    pub async fn set_viewing_key(&self, viewing_key: Zeroizing<String>) -> SyncResult<()> {
        self.expect_ack(WorkerAction::SetViewingKey { viewing_key }).await
    }

    /// Tells the worker a sync run is starting.
    pub async fn begin_sync(&self) -> SyncResult<()> {
        self.expect_ack(WorkerAction::Sync).await
    }

    pub async fn ingest_blocks(
        &self,
        blocks: Vec<CompactBlock>,
        range: IngestRange,
    ) -> SyncResult<DecryptedSnapshot> {
        self.expect_snapshot(WorkerAction::IngestBlocks { blocks, range }).await
    }

    pub async fn get_decrypted_snapshot(&self) -> SyncResult<DecryptedSnapshot> {
        self.expect_snapshot(WorkerAction::GetDecryptedSnapshot).await
    }

    pub async fn clear_session(&self) -> SyncResult<DecryptedSnapshot> {
        self.expect_snapshot(WorkerAction::ClearSession).await
    }

    /// Latest status pushed by the worker (or set locally).
    pub fn status(&self) -> SyncStatus {
        self.shared.status.borrow().clone()
    }

    pub(crate) fn set_status(&self, status: SyncStatus) {
        self.shared.status.send_replace(status);
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.shared.status.subscribe()
    }

    pub fn subscribe_logs(&self) -> broadcast::Receiver<String> {
        self.shared.logs.subscribe()
    }

    /// Replies that arrived for no pending request.
    pub fn discarded_replies(&self) -> u64 {
        self.shared.discarded.load(Ordering::Relaxed)
    }

    pub fn pending_requests(&self) -> usize {
        lock(&self.shared.pending).len()
    }

    pub fn is_terminated(&self) -> bool {
        self.shared.terminated.load(Ordering::SeqCst)
    }

    /// Tears the worker down and rejects every pending request before
    /// returning. Further requests fail with `WorkerTerminated`.
    pub fn destroy(&self) {
        if self.shared.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        lock(&self.requests).take();
        self.dispatcher.abort();
        let rejected = self.shared.reject_all();
        info!("session worker destroyed, rejected {rejected} pending requests");
    }
}

impl Drop for WorkerBridge {
    fn drop(&mut self) {
        self.destroy();
    }
}
