use crate::core::TransactionRecord;

/// Minimum score at which the scoring loop caches an alert. Deliberately
/// below the query default (0.8) so callers can lower the query threshold
/// and still see mid-risk history.
pub const RETENTION_THRESHOLD: f64 = 0.3;

/// Address prefix flagged by the watchlist rule, matched case-insensitively.
const WATCHLIST_PREFIX: &str = "0xabc";

/// Compute the risk score for a transaction, in [0, 1].
///
/// Fixed additive rule set, capped at 1.0:
/// - value above 100 ETH contributes 0.5
/// - gas price above 50 gwei contributes 0.3
/// - sender on the watchlist prefix contributes 0.3
pub fn risk_score(tx: &TransactionRecord) -> f64 {
    let mut score: f64 = 0.0;
    if tx.value_eth > 100.0 {
        score += 0.5;
    }
    if tx.gas_price_gwei > 50.0 {
        score += 0.3;
    }
    if tx.from.to_lowercase().starts_with(WATCHLIST_PREFIX) {
        score += 0.3;
    }
    score.min(1.0)
}
