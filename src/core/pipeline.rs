use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::{debug, warn};

use crate::core::state::PipelineState;
use crate::core::{AlertRecord, TransactionRecord};
use crate::queue::{QueueError, RecordQueue};
use crate::rpc::PendingTxSource;
use crate::signals::{RETENTION_THRESHOLD, risk_score};

/// Run the listener: poll the chain source for newly-pending transactions,
/// normalize each, and push it onto the queue. Runs until process shutdown.
///
/// The fixed sleep after every cycle caps poll frequency against the
/// source; the queue is the only buffer between this loop and the
/// scoring loop, so the backlog is unbounded under sustained load.
pub async fn run_listener<S, Q>(
    mut source: S,
    queue: Q,
    state: Arc<PipelineState>,
    poll_interval: Duration,
) where
    S: PendingTxSource,
    Q: RecordQueue,
{
    state.log("listener started".to_string());
    loop {
        poll_cycle(&mut source, &queue, &state).await;
        tokio::time::sleep(poll_interval).await;
    }
}

/// One poll cycle; returns the number of records enqueued.
///
/// Individual resolution failures are expected (transaction dropped from
/// the mempool, node timeout) and skipped. A failed poll or push is
/// logged and retried on the next cycle; nothing halts the loop.
pub(crate) async fn poll_cycle<S, Q>(source: &mut S, queue: &Q, state: &PipelineState) -> usize
where
    S: PendingTxSource,
    Q: RecordQueue,
{
    let hashes = match source.new_pending_hashes().await {
        Ok(hashes) => hashes,
        Err(e) => {
            warn!("Pending poll failed: {e}");
            return 0;
        }
    };

    let mut enqueued = 0;
    for hash in hashes {
        let record = match source.resolve(&hash).await {
            Ok(Some(record)) => record,
            Ok(None) => continue,
            Err(e) => {
                debug!("Failed to resolve {hash}: {e}");
                continue;
            }
        };
        if let Err(e) = queue.push(&record).await {
            warn!("Failed to enqueue {}: {e}", record.hash);
            continue;
        }
        state.enqueued_total.fetch_add(1, Ordering::Relaxed);
        state.log(format!("enqueued {}", record.hash));
        enqueued += 1;
    }
    enqueued
}

/// Run the scoring loop: drain the queue one record at a time, score each,
/// and cache alerts and activity lines. Runs until process shutdown.
pub async fn run_scoring_loop<Q>(queue: Q, state: Arc<PipelineState>, idle_wait: Duration)
where
    Q: RecordQueue,
{
    state.log("scoring loop started".to_string());
    loop {
        if let Step::Idle = scoring_step(&queue, &state).await {
            tokio::time::sleep(idle_wait).await;
        }
    }
}

/// Outcome of one scoring-loop iteration: whether to keep draining or
/// back off before the next pop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Drained,
    Idle,
}

pub(crate) async fn scoring_step<Q>(queue: &Q, state: &PipelineState) -> Step
where
    Q: RecordQueue,
{
    match queue.pop().await {
        Ok(Some(record)) => {
            process_record(&record, state);
            Step::Drained
        }
        Ok(None) => Step::Idle,
        Err(QueueError::Malformed(e)) => {
            // The payload is consumed and lost; note it and keep draining.
            state.log(format!("dropped malformed queue payload: {e}"));
            Step::Drained
        }
        Err(e) => {
            warn!("Queue pop failed: {e}");
            Step::Idle
        }
    }
}

/// Score one record, cache the activity line, and retain it as an alert
/// when it clears the retention threshold.
pub(crate) fn process_record(record: &TransactionRecord, state: &PipelineState) {
    let score = risk_score(record);
    state.processed_total.fetch_add(1, Ordering::Relaxed);
    state.log(format!("scored {} | risk {score:.2}", record.hash));
    if score >= RETENTION_THRESHOLD {
        state
            .alerts
            .push_front(AlertRecord::from_scored(record, score));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;
    use crate::rpc::RpcError;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::VecDeque;

    fn make_record(hash: &str, value_eth: f64, gas_price_gwei: f64, from: &str) -> TransactionRecord {
        TransactionRecord {
            hash: hash.to_string(),
            from: from.to_string(),
            to: "0xdef456".to_string(),
            value_eth,
            gas_price_gwei,
            observed_at: Utc::now(),
        }
    }

    /// Source double: serves pre-canned hash batches; hashes ending in
    /// "bad" fail resolution, hashes ending in "gone" resolve to nothing.
    struct StubSource {
        batches: VecDeque<Vec<String>>,
    }

    #[async_trait]
    impl PendingTxSource for StubSource {
        async fn new_pending_hashes(&mut self) -> Result<Vec<String>, RpcError> {
            match self.batches.pop_front() {
                Some(batch) => Ok(batch),
                None => Err(RpcError::Rpc(serde_json::json!("filter not found"))),
            }
        }

        async fn resolve(&self, hash: &str) -> Result<Option<TransactionRecord>, RpcError> {
            if hash.ends_with("bad") {
                return Err(RpcError::Rpc(serde_json::json!("node timeout")));
            }
            if hash.ends_with("gone") {
                return Ok(None);
            }
            Ok(Some(make_record(hash, 150.0, 60.0, "0xABC123")))
        }
    }

    #[test]
    fn qualifying_record_produces_alert_and_log() {
        let state = PipelineState::new();
        let record = make_record("0x1", 150.0, 60.0, "0xABC123");
        process_record(&record, &state);

        let alerts = state.alerts.snapshot();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].tx_hash, "0x1");
        assert_eq!(alerts[0].risk_score, 1.0);
        assert!(state.logs.snapshot().iter().any(|l| l.contains("0x1")));
        assert_eq!(state.processed(), 1);
    }

    #[test]
    fn low_risk_record_logs_without_alerting() {
        let state = PipelineState::new();
        let record = make_record("0x2", 1.0, 10.0, "0x123456");
        process_record(&record, &state);

        assert_eq!(state.alerts.len(), 0);
        assert!(state.logs.snapshot().iter().any(|l| l.contains("0x2")));
    }

    #[tokio::test]
    async fn fifteen_qualifying_records_leave_ten_most_recent() {
        let state = PipelineState::new();
        let queue = MemoryQueue::new();
        for i in 0..15 {
            queue
                .push(&make_record(&format!("0x{i:02x}"), 150.0, 60.0, "0xABC123"))
                .await
                .unwrap();
        }

        while scoring_step(&queue, &state).await == Step::Drained {}

        let hashes: Vec<String> = state
            .alerts
            .snapshot()
            .into_iter()
            .map(|a| a.tx_hash)
            .collect();
        assert_eq!(hashes.len(), 10);
        assert_eq!(hashes[0], "0x0e");
        assert_eq!(hashes[9], "0x05");
        assert_eq!(state.processed(), 15);
    }

    #[tokio::test]
    async fn malformed_payload_is_dropped_with_a_note() {
        let state = PipelineState::new();
        let queue = MemoryQueue::new();
        queue.push_raw("{not json");
        queue
            .push(&make_record("0x3", 150.0, 60.0, "0xABC123"))
            .await
            .unwrap();

        // The bad payload is consumed without stopping the drain.
        assert_eq!(scoring_step(&queue, &state).await, Step::Drained);
        assert_eq!(scoring_step(&queue, &state).await, Step::Drained);
        assert_eq!(scoring_step(&queue, &state).await, Step::Idle);

        assert!(
            state
                .logs
                .snapshot()
                .iter()
                .any(|l| l.contains("malformed"))
        );
        assert_eq!(state.alerts.len(), 1);
    }

    #[tokio::test]
    async fn poll_cycle_survives_failed_resolution() {
        let state = PipelineState::new();
        let queue = MemoryQueue::new();
        let mut source = StubSource {
            batches: VecDeque::from(vec![vec![
                "0xa1".to_string(),
                "0xbad".to_string(),
                "0xgone".to_string(),
                "0xa2".to_string(),
            ]]),
        };

        let enqueued = poll_cycle(&mut source, &queue, &state).await;
        assert_eq!(enqueued, 2);
        assert_eq!(queue.depth().await.unwrap(), 2);
        assert_eq!(state.enqueued(), 2);
        assert_eq!(queue.pop().await.unwrap().unwrap().hash, "0xa1");
        assert_eq!(queue.pop().await.unwrap().unwrap().hash, "0xa2");
    }

    #[tokio::test]
    async fn poll_cycle_survives_source_outage() {
        let state = PipelineState::new();
        let queue = MemoryQueue::new();
        let mut source = StubSource {
            batches: VecDeque::new(),
        };

        // Poll error ends the cycle; the loop retries on the next one.
        assert_eq!(poll_cycle(&mut source, &queue, &state).await, 0);
        assert_eq!(queue.depth().await.unwrap(), 0);
    }
}
