use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{ALERT_CACHE_CAPACITY, AlertRecord, LOG_CACHE_CAPACITY};

/// Fixed-capacity, insertion-ordered cache. New entries go to the front;
/// once full, the least-recently-inserted entry falls off the back.
///
/// Guarded by a single mutex: the scoring loop writes, the query handlers
/// read snapshots, and critical sections never cross an await point.
#[derive(Debug)]
pub struct BoundedCache<T> {
    entries: Mutex<VecDeque<T>>,
    capacity: usize,
}

impl<T: Clone> BoundedCache<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push_front(&self, item: T) {
        let mut entries = self.entries.lock().unwrap();
        entries.push_front(item);
        while entries.len() > self.capacity {
            entries.pop_back();
        }
    }

    /// Clone the current contents, most-recent-first.
    pub fn snapshot(&self) -> Vec<T> {
        self.entries.lock().unwrap().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

/// Process-wide pipeline state, constructed once in `main` and shared by
/// reference with both loops and the query layer.
#[derive(Debug)]
pub struct PipelineState {
    pub alerts: BoundedCache<AlertRecord>,
    pub logs: BoundedCache<String>,
    pub enqueued_total: AtomicU64,
    pub processed_total: AtomicU64,
}

impl PipelineState {
    pub fn new() -> Self {
        Self {
            alerts: BoundedCache::new(ALERT_CACHE_CAPACITY),
            logs: BoundedCache::new(LOG_CACHE_CAPACITY),
            enqueued_total: AtomicU64::new(0),
            processed_total: AtomicU64::new(0),
        }
    }

    /// Record an operational note: mirrored to tracing and the log cache.
    pub fn log(&self, line: String) {
        tracing::info!("{line}");
        self.logs.push_front(line);
    }

    pub fn enqueued(&self) -> u64 {
        self.enqueued_total.load(Ordering::Relaxed)
    }

    pub fn processed(&self) -> u64 {
        self.processed_total.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn push_front_orders_most_recent_first() {
        let cache = BoundedCache::new(5);
        cache.push_front(1);
        cache.push_front(2);
        cache.push_front(3);
        assert_eq!(cache.snapshot(), vec![3, 2, 1]);
    }

    #[test]
    fn eviction_drops_oldest_beyond_capacity() {
        let cache = BoundedCache::new(3);
        for i in 0..10 {
            cache.push_front(i);
        }
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.snapshot(), vec![9, 8, 7]);
    }

    #[test]
    fn alert_cache_capped_at_ten() {
        let state = PipelineState::new();
        for i in 0..15 {
            state.alerts.push_front(AlertRecord {
                tx_hash: format!("0x{i:02x}"),
                risk_score: 1.0,
                from: "0xabc".into(),
                to: String::new(),
                timestamp: Utc::now(),
            });
        }
        assert_eq!(state.alerts.len(), 10);
        let hashes: Vec<String> = state
            .alerts
            .snapshot()
            .into_iter()
            .map(|a| a.tx_hash)
            .collect();
        assert_eq!(hashes[0], "0x0e");
        assert_eq!(hashes[9], "0x05");
    }

    #[test]
    fn log_cache_capped_at_twenty() {
        let state = PipelineState::new();
        for i in 0..30 {
            state.log(format!("line {i}"));
        }
        assert_eq!(state.logs.len(), 20);
        let lines = state.logs.snapshot();
        assert_eq!(lines[0], "line 29");
        assert_eq!(lines[19], "line 10");
    }
}
