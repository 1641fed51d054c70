use serde::{Deserialize, Serialize};
use std::fmt;

/// A decrypted shielded transaction as seen through the viewing key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub txid: String,
    pub height: u64,
    /// Net value change for this wallet, in the chain's smallest unit.
    pub amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    pub confirmed: u64,
    pub unconfirmed: u64,
}

impl fmt::Debug for Balances {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Balances { .. }")
    }
}

/// Complete in-memory copy of what the viewing key has revealed so far.
///
/// Produced only by the worker and never persisted. `Debug` prints counts,
/// not contents, so a snapshot can't leak through a log line.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptedSnapshot {
    pub transactions: Vec<Transaction>,
    pub balances: Option<Balances>,
}

impl DecryptedSnapshot {
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty() && self.balances.is_none()
    }

    pub fn clear(&mut self) {
        self.transactions.clear();
        self.balances = None;
    }
}

impl fmt::Debug for DecryptedSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptedSnapshot")
            .field("transactions", &self.transactions.len())
            .field("has_balances", &self.balances.is_some())
            .finish()
    }
}
