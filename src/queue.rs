//! Per-(file, direction) queue: pending list, dispatch list, aIOLi/MLF
//! shift-detection state, and rolling statistics. Ported from the `queue_t`
//! usage spread across `req_hashtable.c` and `waiting_common.c`.

use crate::request::Request;
use crate::stats::QueueStatistics;

/// One queue per file per direction (read queue, write queue).
pub struct Queue {
    /// Requests not yet dispatched, ordered by `(offset, length)` (invariant
    /// 6). Populated only while a hashtable-based policy is active; under a
    /// timeline-based policy this stays empty and the timeline is
    /// authoritative (see `timeline.rs`).
    pub pending: Vec<Request>,

    /// Requests handed to the user's callback but not yet released.
    pub dispatch: Vec<Request>,

    /// Sum of `length` over every request this queue currently owns
    /// (pending + dispatch), ported from `req_file_t::timeline_reqnb`'s
    /// sibling counter `req_file_t::current_size`.
    pub current_size: u64,

    /// Timestamp (ns) of the last request this queue received, used to
    /// feed `QueueStatistics::on_arrival`'s inter-arrival computation.
    pub last_req_time: Option<i64>,

    /// End offset of the last request received, used for the average
    /// seek-distance statistic.
    pub last_received_finaloffset: Option<u64>,

    pub stats: QueueStatistics,

    // --- aIOLi / MLF shift-detection state, ported from waiting_common.c ---
    pub last_start_off: Option<u64>,
    pub last_final_off: Option<u64>,
    pub predicted_off: Option<u64>,
    pub last_aggregation: i64,
    pub best_agg: i64,

    /// aIOLi's per-queue quantum, doubled/halved as shift/aggregation
    /// behavior is detected (`waiting_common.c::update_waiting_time_counters`).
    pub next_quantum: u64,
}

impl Queue {
    pub fn new(initial_quantum: u64) -> Self {
        Queue {
            pending: Vec::new(),
            dispatch: Vec::new(),
            current_size: 0,
            last_req_time: None,
            last_received_finaloffset: None,
            stats: QueueStatistics::default(),
            last_start_off: None,
            last_final_off: None,
            predicted_off: None,
            last_aggregation: 0,
            best_agg: 0,
            next_quantum: initial_quantum,
        }
    }

    /// Inserts `req` into `pending`, keeping the `(offset, length)` order
    /// invariant (invariant 6). Only meaningful under hashtable policies.
    pub fn insert_sorted(&mut self, req: Request) {
        let key = req.sort_key();
        let pos = self
            .pending
            .partition_point(|existing| existing.sort_key() <= key);
        self.pending.insert(pos, req);
    }

    /// Records statistics and bookkeeping for a request that just arrived
    /// in this queue, regardless of which index will end up storing it.
    pub fn note_arrival(&mut self, arrival_time: i64, length: u64, offset: u64) {
        self.stats.on_arrival(
            arrival_time,
            length,
            offset,
            self.last_req_time,
            self.last_received_finaloffset,
        );
        self.current_size += length;
        self.last_req_time = Some(arrival_time);
        self.last_received_finaloffset = Some(offset + length);
    }

    /// Moves `req` from `pending` into `dispatch`, stamping its dispatch
    /// timestamp and decrementing `current_size` by its length. Ported
    /// from `process_request.c::put_this_request_in_dispatch`.
    ///
    /// A `Virtual` is split into its simple children here rather than
    /// pushed as one wrapper entry: release/cancel look a dispatched
    /// request up by its own `(offset, length)`, which only a child (not
    /// the virtual's bounding box) can satisfy. The aggregation size is
    /// still recorded on `stats` before the wrapper is dropped.
    pub fn move_to_dispatch(&mut self, index: usize, now_ns: i64) -> Request {
        let mut req = self.pending.remove(index);
        req.set_dispatch_time(now_ns);
        self.current_size = self.current_size.saturating_sub(req.length());
        self.stats.on_aggregation(req.reqnb() as i64);
        match &req {
            Request::Simple(_) => self.dispatch.push(req.clone()),
            Request::Virtual(v) => {
                for child in &v.children {
                    let mut child_req = Request::Simple(child.clone());
                    child_req.set_dispatch_time(now_ns);
                    self.dispatch.push(child_req);
                }
            }
        }
        req
    }

    /// Removes and returns the dispatch-list entry matching `(offset, length)`
    /// exactly, as looked up during release/cancel.
    pub fn take_from_dispatch(&mut self, offset: u64, length: u64) -> Option<Request> {
        let idx = self
            .dispatch
            .iter()
            .position(|r| r.offset() == offset && r.length() == length)?;
        Some(self.dispatch.remove(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{RequestType, SimpleRequest};

    fn simple(offset: u64, length: u64) -> Request {
        Request::Simple(SimpleRequest {
            file_id: "f".into(),
            req_type: RequestType::Read,
            offset,
            length,
            user_id: 0,
            queue_id: 0,
            arrival_time: 0,
            dispatch_time: None,
            timestamp: 0,
            sched_factor: 0,
            sw_priority: 0,
            callback: None,
        })
    }

    #[test]
    fn insert_sorted_keeps_offset_order() {
        let mut q = Queue::new(8192);
        q.insert_sorted(simple(100, 10));
        q.insert_sorted(simple(0, 10));
        q.insert_sorted(simple(50, 10));
        let offsets: Vec<u64> = q.pending.iter().map(|r| r.offset()).collect();
        assert_eq!(offsets, vec![0, 50, 100]);
    }

    #[test]
    fn move_to_dispatch_decrements_current_size() {
        let mut q = Queue::new(8192);
        q.note_arrival(0, 10, 0);
        q.insert_sorted(simple(0, 10));
        assert_eq!(q.current_size, 10);
        q.move_to_dispatch(0, 100);
        assert_eq!(q.current_size, 0);
        assert_eq!(q.dispatch.len(), 1);
    }

    #[test]
    fn take_from_dispatch_matches_exact_offset_and_length() {
        let mut q = Queue::new(8192);
        q.dispatch.push(simple(10, 20));
        assert!(q.take_from_dispatch(10, 21).is_none());
        assert!(q.take_from_dispatch(10, 20).is_some());
        assert!(q.dispatch.is_empty());
    }

    #[test]
    fn move_to_dispatch_splits_virtual_into_releasable_children() {
        use crate::aggregation::include;

        let mut q = Queue::new(8192);
        let mut head = simple(0, 100);
        let merged = include(&mut head, simple(100, 50), 16);
        assert!(merged.is_none());
        q.pending.push(head);

        let req = q.move_to_dispatch(0, 100);
        assert_eq!(req.reqnb(), 2);
        assert_eq!(q.dispatch.len(), 2);

        // Each original child is now releasable by its own (offset, length),
        // which the aggregate's bounding box (0, 150) could never match.
        assert!(q.take_from_dispatch(0, 100).is_some());
        assert!(q.take_from_dispatch(100, 50).is_some());
        assert!(q.dispatch.is_empty());
    }
}
