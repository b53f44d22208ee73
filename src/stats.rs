//! Statistics: per-queue rolling counters updated on arrival/release, and
//! global process-wide counters exposed through `Engine::metrics_snapshot_and_reset`.
//! Ported from `original_source/src/statistics.c`.

use serde::{Deserialize, Serialize};

use crate::time::update_iterative_average;

/// Per-(file, direction) rolling statistics. Values use `-1` as the
/// "no samples yet" sentinel, matching the source's `reset_stats_queue`.
#[derive(Debug, Clone)]
pub struct QueueStatistics {
    pub received_reqnb: i64,
    pub processed_reqnb: i64,
    pub released_reqnb: i64,
    pub processed_req_size: i64,
    pub processed_bandwidth: i64,
    pub avg_req_size: i64,
    pub avg_time_between_requests: i64,
    pub avg_distance: i64,
    pub aggs_no: i64,
    pub avg_agg_size: i64,
    pub best_agg: i64,
}

impl Default for QueueStatistics {
    fn default() -> Self {
        QueueStatistics {
            received_reqnb: 0,
            processed_reqnb: 0,
            released_reqnb: 0,
            processed_req_size: 0,
            processed_bandwidth: -1,
            avg_req_size: -1,
            avg_time_between_requests: -1,
            avg_distance: -1,
            aggs_no: 0,
            avg_agg_size: -1,
            best_agg: 0,
        }
    }
}

impl QueueStatistics {
    /// Ported from `statistics.c::update_local_stats`.
    pub fn on_arrival(
        &mut self,
        arrival_time: i64,
        length: u64,
        offset: u64,
        last_req_time: Option<i64>,
        last_final_offset: Option<u64>,
    ) {
        self.received_reqnb += 1;
        if self.received_reqnb > 1 {
            if let Some(last) = last_req_time {
                let elapsed = arrival_time - last;
                self.avg_time_between_requests = update_iterative_average(
                    self.avg_time_between_requests,
                    elapsed,
                    self.received_reqnb - 1,
                );
            }
            if let Some(last_off) = last_final_offset {
                let distance = (offset as i64 - last_off as i64).abs();
                self.avg_distance =
                    update_iterative_average(self.avg_distance, distance, self.received_reqnb - 1);
            }
        }
        self.avg_req_size =
            update_iterative_average(self.avg_req_size, length as i64, self.received_reqnb);
    }

    /// Ported from `statistics.c::stats_aggregation`.
    pub fn on_aggregation(&mut self, aggregation_size: i64) {
        if aggregation_size > 1 {
            self.aggs_no += 1;
            self.avg_agg_size =
                update_iterative_average(self.avg_agg_size, aggregation_size, self.aggs_no);
            if self.best_agg < aggregation_size {
                self.best_agg = aggregation_size;
            }
        }
    }

    /// Ported from `statistics.c::reset_stats_queue`.
    pub fn reset(&mut self) {
        *self = QueueStatistics::default();
    }
}

/// Process-wide statistics, ported from `struct global_statistics_t`.
#[derive(Debug, Clone)]
pub struct GlobalStatistics {
    pub total_reqnb: i64,
    pub reads: i64,
    pub writes: i64,
    pub avg_time_between_requests: i64,
    pub avg_request_size: i64,
    last_arrival: Option<i64>,
}

impl Default for GlobalStatistics {
    fn default() -> Self {
        GlobalStatistics {
            total_reqnb: 0,
            reads: 0,
            writes: 0,
            avg_time_between_requests: -1,
            avg_request_size: -1,
            last_arrival: None,
        }
    }
}

impl GlobalStatistics {
    /// Ported from `statistics.c::update_global_stats_newreq`.
    pub fn on_arrival(&mut self, arrival_time: i64, length: u64, is_read: bool) {
        self.total_reqnb += 1;
        if self.total_reqnb > 1 {
            if let Some(last) = self.last_arrival {
                let elapsed = arrival_time - last;
                self.avg_time_between_requests = update_iterative_average(
                    self.avg_time_between_requests,
                    elapsed,
                    self.total_reqnb - 1,
                );
            }
        }
        self.last_arrival = Some(arrival_time);
        self.avg_request_size =
            update_iterative_average(self.avg_request_size, length as i64, self.total_reqnb);
        if is_read {
            self.reads += 1;
        } else {
            self.writes += 1;
        }
    }

    pub fn reset(&mut self) {
        *self = GlobalStatistics::default();
    }
}

/// Snapshot returned by `Engine::metrics_snapshot_and_reset`, per spec §6.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub total: i64,
    pub reads: i64,
    pub writes: i64,
    pub avg_inter_arrival_ns: i64,
    pub avg_size: i64,
    pub max_size: i64,
    pub file_count: i64,
    pub avg_offset_distance: i64,
    pub served_bytes: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_sets_avg_size_with_no_distance() {
        let mut s = QueueStatistics::default();
        s.on_arrival(1000, 100, 0, None, None);
        assert_eq!(s.received_reqnb, 1);
        assert_eq!(s.avg_req_size, 100);
        assert_eq!(s.avg_distance, -1);
    }

    #[test]
    fn second_sample_updates_distance_and_inter_arrival() {
        let mut s = QueueStatistics::default();
        s.on_arrival(1000, 100, 0, None, None);
        s.on_arrival(2000, 100, 100, Some(1000), Some(100));
        assert_eq!(s.avg_time_between_requests, 1000);
        assert_eq!(s.avg_distance, 0);
    }

    #[test]
    fn global_stats_counts_reads_and_writes() {
        let mut g = GlobalStatistics::default();
        g.on_arrival(0, 10, true);
        g.on_arrival(10, 10, false);
        assert_eq!(g.reads, 1);
        assert_eq!(g.writes, 1);
        assert_eq!(g.total_reqnb, 2);
    }
}
