//! Bounded history of per-epoch performance samples, used by the dynamic
//! policy selector to compare algorithms against each other. Ported from
//! `original_source/src/performance.c`.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// One scheduling-algorithm epoch's accumulated performance.
#[derive(Debug, Clone)]
pub struct PerformanceEntry {
    pub policy_name: &'static str,
    pub epoch_start_ns: i64,
    pub reqnb: i64,
    pub size: i64,
    pub bandwidth: i64,
}

impl PerformanceEntry {
    fn new(policy_name: &'static str, epoch_start_ns: i64) -> Self {
        PerformanceEntry {
            policy_name,
            epoch_start_ns,
            reqnb: 0,
            size: 0,
            bandwidth: -1,
        }
    }
}

/// Ring of retained epochs, capped at `performance_values` entries
/// (default 5, per `agios_config.c`). Oldest epochs are evicted first.
pub struct PerformanceRing {
    entries: Mutex<VecDeque<PerformanceEntry>>,
    cap: usize,
}

impl PerformanceRing {
    pub fn new(cap: usize) -> Self {
        PerformanceRing {
            entries: Mutex::new(VecDeque::new()),
            cap,
        }
    }

    /// Starts a new epoch for `policy_name`, evicting the oldest entry if
    /// the ring is already at capacity. Ported from
    /// `performance_set_new_algorithm`.
    pub fn start_epoch(&self, policy_name: &'static str, now_ns: i64) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.cap {
            entries.pop_front();
        }
        entries.push_back(PerformanceEntry::new(policy_name, now_ns));
    }

    /// Associates a released request's `dispatch_timestamp` with the epoch
    /// that was active when it was dispatched, by walking backward from
    /// the newest entry. Ported from `get_request_entry`: if the request
    /// predates the oldest retained epoch, it's silently dropped (the
    /// sample is too old to attribute to any tracked epoch).
    pub fn record_release(&self, dispatch_timestamp: i64, length: i64, bandwidth_sample: i64) -> bool {
        let mut entries = self.entries.lock();
        for entry in entries.iter_mut().rev() {
            if entry.epoch_start_ns <= dispatch_timestamp {
                entry.reqnb += 1;
                entry.size += length;
                entry.bandwidth = crate::time::update_iterative_average(
                    entry.bandwidth,
                    bandwidth_sample,
                    entry.reqnb,
                );
                return true;
            }
        }
        false
    }

    /// True when `dispatch_timestamp` falls within the newest (currently
    /// active) epoch — used to decide whether to bump the engine's
    /// dynamic-selection `processed_reqnb` counter.
    pub fn is_current_epoch(&self, dispatch_timestamp: i64) -> bool {
        let entries = self.entries.lock();
        match entries.back() {
            Some(current) => dispatch_timestamp >= current.epoch_start_ns,
            None => false,
        }
    }

    pub fn snapshot(&self) -> Vec<PerformanceEntry> {
        self.entries.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_past_cap() {
        let ring = PerformanceRing::new(2);
        ring.start_epoch("TO", 0);
        ring.start_epoch("SJF", 10);
        ring.start_epoch("MLF", 20);
        let names: Vec<&str> = ring.snapshot().iter().map(|e| e.policy_name).collect();
        assert_eq!(names, vec!["SJF", "MLF"]);
    }

    #[test]
    fn record_release_attributes_to_owning_epoch() {
        let ring = PerformanceRing::new(5);
        ring.start_epoch("TO", 0);
        ring.start_epoch("SJF", 100);
        assert!(ring.record_release(50, 10, 1));
        assert!(ring.record_release(150, 10, 1));
        let snap = ring.snapshot();
        assert_eq!(snap[0].reqnb, 1);
        assert_eq!(snap[1].reqnb, 1);
    }

    #[test]
    fn record_release_before_oldest_epoch_is_dropped() {
        let ring = PerformanceRing::new(1);
        ring.start_epoch("TO", 1000);
        assert!(!ring.record_release(0, 10, 1));
    }

    #[test]
    fn is_current_epoch_checks_newest_only() {
        let ring = PerformanceRing::new(5);
        ring.start_epoch("TO", 0);
        ring.start_epoch("SJF", 100);
        assert!(!ring.is_current_epoch(50));
        assert!(ring.is_current_epoch(150));
    }
}
