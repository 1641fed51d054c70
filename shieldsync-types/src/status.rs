use serde::{Deserialize, Serialize};

/// Sync lifecycle stage.
///
/// Advances idle → syncing → scanning → ready. Only an explicit reset returns
/// to idle, and `Error` can be entered from anywhere.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStage {
    #[default]
    Idle,
    Syncing,
    Scanning,
    Ready,
    Error,
}

impl SyncStage {
    /// Position along the forward path. `Error` sits outside it.
    pub fn rank(&self) -> Option<u8> {
        match self {
            SyncStage::Idle => Some(0),
            SyncStage::Syncing => Some(1),
            SyncStage::Scanning => Some(2),
            SyncStage::Ready => Some(3),
            SyncStage::Error => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub stage: SyncStage,
    /// 0–100.
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_scanned_height: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_chain_height: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl SyncStatus {
    pub fn idle() -> Self {
        Self::default()
    }

    /// Caught up to `tip`.
    pub fn ready_at(tip: u64) -> Self {
        Self {
            stage: SyncStage::Ready,
            progress: 100,
            latest_scanned_height: Some(tip),
            latest_chain_height: Some(tip),
            error_message: None,
        }
    }

    /// Error state that keeps whatever heights were already known.
    pub fn into_error(self, message: impl Into<String>) -> Self {
        Self {
            stage: SyncStage::Error,
            error_message: Some(message.into()),
            ..self
        }
    }

    pub fn is_error(&self) -> bool {
        self.stage == SyncStage::Error
    }
}
