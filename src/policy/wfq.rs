//! Weighted Fair Queueing, credit-based: each `queue_id` accumulates
//! `credit += weight` every visit, and its head is dispatched once
//! `weight + credit >= head.length`. The on-disk source for this policy
//! is a non-functional stub (reads an env var, never parses it, and
//! copy-pastes TWINS's dispatch loop), so this implementation is built
//! directly from the credit-based description instead of ported code.

use parking_lot::Mutex;

use crate::dispatch::Batch;
use crate::policy::{finalize_dispatch, PolicyId, ScheduleOutcome, SchedulingContext, SchedulingPolicy};

struct WfqState {
    current_queue: u32,
    credit: Vec<i64>,
}

pub struct Wfq {
    state: Mutex<WfqState>,
    weights: Vec<i64>,
}

impl Wfq {
    /// `weights[queue_id]` must be supplied for every queue id up to
    /// `max_queue_id`; unconfigured queues default to weight `1`.
    pub fn new(weights: Vec<i64>) -> Self {
        let credit = vec![0; weights.len()];
        Wfq {
            state: Mutex::new(WfqState { current_queue: 0, credit }),
            weights,
        }
    }

    fn queue_count(&self) -> u32 {
        self.weights.len() as u32
    }
}

impl SchedulingPolicy for Wfq {
    fn id(&self) -> PolicyId {
        PolicyId::Wfq
    }

    fn uses_hashtable(&self) -> bool {
        false
    }

    fn max_aggregation(&self) -> usize {
        1
    }

    fn schedule(&self, ctx: &SchedulingContext) -> ScheduleOutcome {
        let n = self.queue_count();
        if n == 0 {
            return ScheduleOutcome::Idle { sleep_hint_ns: 5_000_000 };
        }

        let mut state = self.state.lock();
        let cur = state.current_queue;
        let amount = self.weights[cur as usize] + state.credit[cur as usize];

        match ctx.timeline.peek_queue_len(cur) {
            None => {
                state.current_queue = (cur + 1) % n;
                ScheduleOutcome::Idle { sleep_hint_ns: 0 }
            }
            Some(head_len) if amount >= head_len as i64 => {
                let req = ctx
                    .timeline
                    .pop_from_queue(cur)
                    .expect("peeked request must still be there under the same lock window");
                let remaining_credit = amount - head_len as i64;
                let queue_emptied = ctx.timeline.queue_len(cur) == 0;
                state.credit[cur as usize] = if queue_emptied { 0 } else { remaining_credit };
                if queue_emptied {
                    state.current_queue = (cur + 1) % n;
                }
                drop(state);
                let req = finalize_dispatch(ctx.hashtable, ctx.current_filenb, req, ctx.now_ns);
                ScheduleOutcome::Dispatched(Batch::from_request(req))
            }
            Some(_) => {
                state.credit[cur as usize] = amount;
                state.current_queue = (cur + 1) % n;
                ScheduleOutcome::Idle { sleep_hint_ns: 0 }
            }
        }
    }
}
