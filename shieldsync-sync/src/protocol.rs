//! Caller ↔ worker message protocol.
//!
//! Requests carry a `requestId` and an `action` tag. The worker answers each
//! one with exactly one correlated `ok`, `snapshot` or `error` message, and may
//! push `syncStatus`, `log` and uncorrelated fatal `error` messages at any time.

use serde::{Deserialize, Serialize};
use shieldsync_types::{CompactBlock, DecryptedSnapshot, Network, SyncStatus};
use std::fmt;
use zeroize::Zeroizing;

pub type RequestId = String;

/// Which reply a successful request resolves with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Ok,
    Snapshot,
}

/// Action names as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    Init,
    SetViewingKey,
    Sync,
    IngestBlocks,
    GetDecryptedSnapshot,
    ClearSession,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Init => "init",
            ActionKind::SetViewingKey => "setViewingKey",
            ActionKind::Sync => "sync",
            ActionKind::IngestBlocks => "ingestBlocks",
            ActionKind::GetDecryptedSnapshot => "getDecryptedSnapshot",
            ActionKind::ClearSession => "clearSession",
        }
    }

    pub fn expected_reply(&self) -> ReplyKind {
        match self {
            ActionKind::Init | ActionKind::SetViewingKey | ActionKind::Sync => ReplyKind::Ok,
            ActionKind::IngestBlocks
            | ActionKind::GetDecryptedSnapshot
            | ActionKind::ClearSession => ReplyKind::Snapshot,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Heights describing one ingested chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRange {
    pub start_height: u64,
    pub end_height: u64,
    pub tip_height: u64,
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum WorkerAction {
    Init {
        network: Network,
    },
    SetViewingKey {
        viewing_key: Zeroizing<String>,
    },
    Sync,
    IngestBlocks {
        blocks: Vec<CompactBlock>,
        range: IngestRange,
    },
    GetDecryptedSnapshot,
    ClearSession,
}

impl WorkerAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            WorkerAction::Init { .. } => ActionKind::Init,
            WorkerAction::SetViewingKey { .. } => ActionKind::SetViewingKey,
            WorkerAction::Sync => ActionKind::Sync,
            WorkerAction::IngestBlocks { .. } => ActionKind::IngestBlocks,
            WorkerAction::GetDecryptedSnapshot => ActionKind::GetDecryptedSnapshot,
            WorkerAction::ClearSession => ActionKind::ClearSession,
        }
    }
}

impl fmt::Debug for WorkerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerAction::Init { network } => {
                f.debug_struct("Init").field("network", network).finish()
            }
            WorkerAction::SetViewingKey { .. } => f
                .debug_struct("SetViewingKey")
                .field("viewing_key", &"[REDACTED]")
                .finish(),
            WorkerAction::IngestBlocks { blocks, range } => f
                .debug_struct("IngestBlocks")
                .field("blocks", &blocks.len())
                .field("range", range)
                .finish(),
            other => f.write_str(other.kind().as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRequest {
    pub request_id: RequestId,
    #[serde(flatten)]
    pub action: WorkerAction,
}

impl WorkerRequest {
    pub fn new(request_id: impl Into<RequestId>, action: WorkerAction) -> Self {
        Self {
            request_id: request_id.into(),
            action,
        }
    }
}

/// Machine-readable reason attached to error replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    Precondition,
    InvalidKey,
    Engine,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum WorkerMessage {
    Ok {
        request_id: RequestId,
        action: ActionKind,
    },
    Snapshot {
        request_id: RequestId,
        payload: DecryptedSnapshot,
    },
    SyncStatus {
        payload: SyncStatus,
    },
    Log {
        message: String,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<RequestId>,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        fatal: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<ErrorCode>,
    },
}

impl WorkerMessage {
    /// Correlation id, if this message answers a request.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            WorkerMessage::Ok { request_id, .. } | WorkerMessage::Snapshot { request_id, .. } => {
                Some(request_id)
            }
            WorkerMessage::Error { request_id, .. } => request_id.as_deref(),
            WorkerMessage::SyncStatus { .. } | WorkerMessage::Log { .. } => None,
        }
    }

    pub fn log(message: impl Into<String>) -> Self {
        WorkerMessage::Log {
            message: message.into(),
        }
    }

    /// Uncorrelated fatal error: the worker can't go on.
    pub fn fatal(message: impl Into<String>) -> Self {
        WorkerMessage::Error {
            message: message.into(),
            request_id: None,
            fatal: true,
            code: Some(ErrorCode::Internal),
        }
    }
}
