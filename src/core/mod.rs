pub mod pipeline;
pub mod state;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Most recent qualifying alerts kept for querying.
pub const ALERT_CACHE_CAPACITY: usize = 10;

/// Most recent activity log lines kept for querying.
pub const LOG_CACHE_CAPACITY: usize = 20;

/// One observed pending transaction, normalized to whole-coin units.
///
/// This is the queue wire record: its JSON encoding must round-trip
/// losslessly between producer and consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub hash: String,
    pub from: String,
    /// Empty for contract-creation transactions.
    pub to: String,
    pub value_eth: f64,
    pub gas_price_gwei: f64,
    pub observed_at: DateTime<Utc>,
}

/// A scored transaction that met the retention rule, ready for querying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub tx_hash: String,
    pub risk_score: f64,
    pub from: String,
    pub to: String,
    pub timestamp: DateTime<Utc>,
}

impl AlertRecord {
    pub fn from_scored(tx: &TransactionRecord, risk_score: f64) -> Self {
        Self {
            tx_hash: tx.hash.clone(),
            risk_score,
            from: tx.from.clone(),
            to: tx.to.clone(),
            timestamp: tx.observed_at,
        }
    }
}
