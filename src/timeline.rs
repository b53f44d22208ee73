//! Single-locked global timeline plus the per-queue-id `multi_timeline`
//! used by TWINS/WFQ. Ported from `original_source/src/req_timeline.c`.

use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::request::Request;

struct TimelineState {
    /// FIFO order used by TO/TO-agg/NOOP; SW also lives here but ordered by
    /// `sw_priority` instead of arrival order.
    fifo: VecDeque<Request>,
    /// One queue per `queue_id`, used only by TWINS/WFQ.
    multi: Vec<VecDeque<Request>>,
}

pub struct Timeline {
    state: Mutex<TimelineState>,
}

/// How a policy wants new requests ordered within the shared timeline.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum InsertionOrder {
    /// Plain arrival-order append (TO, TO-agg, NOOP).
    Fifo,
    /// Insertion-sorted by `sw_priority` (SW).
    SwPriority,
    /// Appended to `multi_timeline[queue_id]` (TWINS, WFQ).
    PerQueue,
}

impl Timeline {
    pub fn new(max_queue_id: u32) -> Self {
        let mut multi = Vec::with_capacity(max_queue_id as usize + 1);
        for _ in 0..=max_queue_id {
            multi.push(VecDeque::new());
        }
        Timeline {
            state: Mutex::new(TimelineState {
                fifo: VecDeque::new(),
                multi,
            }),
        }
    }

    /// Ported from `req_timeline.c::__timeline_add_req`.
    pub fn insert(&self, req: Request, order: InsertionOrder) {
        let mut state = self.state.lock();
        match order {
            InsertionOrder::Fifo => state.fifo.push_back(req),
            InsertionOrder::SwPriority => {
                let priority = match &req {
                    Request::Simple(r) => r.sw_priority,
                    Request::Virtual(_) => 0,
                };
                let pos = state
                    .fifo
                    .iter()
                    .position(|existing| {
                        let existing_priority = match existing {
                            Request::Simple(r) => r.sw_priority,
                            Request::Virtual(_) => 0,
                        };
                        existing_priority > priority
                    })
                    .unwrap_or(state.fifo.len());
                state.fifo.insert(pos, req);
            }
            InsertionOrder::PerQueue => {
                let qid = req.queue_id() as usize;
                state.multi[qid].push_back(req);
            }
        }
    }

    /// Attempts to extend the timeline's tail-most request for this file
    /// with `req` via aggregation; returns `req` back if no merge
    /// happened. Used by TO-agg, ported from the `CHECK_AGGREGATE` scan in
    /// `__timeline_add_req`.
    pub fn try_aggregate_tail(
        &self,
        req: Request,
        max_aggregation: usize,
        merge: impl Fn(&mut Request, Request) -> Option<Request>,
    ) -> Option<Request> {
        let mut state = self.state.lock();
        if let Some(tail) = state.fifo.back_mut() {
            if tail.reqnb() < max_aggregation {
                return merge(tail, req);
            }
        }
        Some(req)
    }

    /// Pops the oldest request from the plain FIFO (TO/TO-agg/SW/NOOP).
    pub fn pop_oldest(&self) -> Option<Request> {
        self.state.lock().fifo.pop_front()
    }

    /// Pops the oldest request belonging to `queue_id` (TWINS/WFQ).
    pub fn pop_from_queue(&self, queue_id: u32) -> Option<Request> {
        self.state.lock().multi[queue_id as usize].pop_front()
    }

    /// Length of `queue_id`'s head request, without removing it (WFQ's
    /// credit check needs to see the cost before committing to dispatch).
    pub fn peek_queue_len(&self, queue_id: u32) -> Option<u64> {
        self.state.lock().multi[queue_id as usize]
            .front()
            .map(|r| r.length())
    }

    pub fn queue_len(&self, queue_id: u32) -> usize {
        self.state.lock().multi[queue_id as usize].len()
    }

    pub fn is_empty(&self) -> bool {
        let state = self.state.lock();
        state.fifo.is_empty() && state.multi.iter().all(|q| q.is_empty())
    }

    /// Removes and returns the first request (in the plain FIFO, then
    /// each `multi_timeline` slot in turn) matching `predicate`. Used by
    /// cancel, which may need to pull a request back out of whichever
    /// section of the timeline is currently in use.
    pub fn take_matching(&self, predicate: impl Fn(&Request) -> bool) -> Option<Request> {
        let mut state = self.state.lock();
        if let Some(idx) = state.fifo.iter().position(&predicate) {
            return state.fifo.remove(idx);
        }
        for q in state.multi.iter_mut() {
            if let Some(idx) = q.iter().position(&predicate) {
                return q.remove(idx);
            }
        }
        None
    }

    /// Re-inserts `req` at the front of whichever section it came out of,
    /// used when a cancel only partially consumes a virtual request and
    /// the remainder needs to go back in.
    pub fn put_back(&self, req: Request, order: InsertionOrder) {
        let mut state = self.state.lock();
        match order {
            InsertionOrder::PerQueue => {
                let qid = req.queue_id() as usize;
                state.multi[qid].push_front(req);
            }
            _ => state.fifo.push_front(req),
        }
    }

    /// Empties every queue (the plain FIFO and every `multi_timeline`
    /// slot) in one locked pass, returning everything it held. Used when
    /// migrating away from a timeline-based policy.
    pub fn drain_all(&self) -> Vec<Request> {
        let mut state = self.state.lock();
        let mut out: Vec<Request> = state.fifo.drain(..).collect();
        for q in state.multi.iter_mut() {
            out.extend(q.drain(..));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{RequestType, SimpleRequest};

    fn simple(offset: u64, queue_id: u32, sw_priority: i64) -> Request {
        Request::Simple(SimpleRequest {
            file_id: "f".into(),
            req_type: RequestType::Read,
            offset,
            length: 10,
            user_id: 0,
            queue_id,
            arrival_time: 0,
            dispatch_time: None,
            timestamp: 0,
            sched_factor: 0,
            sw_priority,
            callback: None,
        })
    }

    #[test]
    fn fifo_preserves_arrival_order() {
        let tl = Timeline::new(0);
        tl.insert(simple(0, 0, 0), InsertionOrder::Fifo);
        tl.insert(simple(10, 0, 0), InsertionOrder::Fifo);
        assert_eq!(tl.pop_oldest().unwrap().offset(), 0);
        assert_eq!(tl.pop_oldest().unwrap().offset(), 10);
    }

    #[test]
    fn sw_priority_orders_by_priority_not_arrival() {
        let tl = Timeline::new(0);
        tl.insert(simple(0, 0, 5), InsertionOrder::SwPriority);
        tl.insert(simple(10, 0, 1), InsertionOrder::SwPriority);
        assert_eq!(tl.pop_oldest().unwrap().offset(), 10);
        assert_eq!(tl.pop_oldest().unwrap().offset(), 0);
    }

    #[test]
    fn per_queue_routes_to_correct_multi_timeline_slot() {
        let tl = Timeline::new(2);
        tl.insert(simple(0, 2, 0), InsertionOrder::PerQueue);
        tl.insert(simple(10, 0, 0), InsertionOrder::PerQueue);
        assert_eq!(tl.pop_from_queue(2).unwrap().offset(), 0);
        assert_eq!(tl.pop_from_queue(0).unwrap().offset(), 10);
        assert!(tl.pop_from_queue(1).is_none());
    }
}
