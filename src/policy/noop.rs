//! NOOP: dispatches whatever is left in the timeline from before the
//! migration into NOOP happened, one at a time, in FIFO order. Ported
//! from `original_source/src/NOOP.c`.

use crate::dispatch::Batch;
use crate::policy::{finalize_dispatch, PolicyId, ScheduleOutcome, SchedulingContext, SchedulingPolicy};

pub struct Noop;

impl SchedulingPolicy for Noop {
    fn id(&self) -> PolicyId {
        PolicyId::Noop
    }

    fn uses_hashtable(&self) -> bool {
        false
    }

    fn max_aggregation(&self) -> usize {
        1
    }

    fn schedule(&self, ctx: &SchedulingContext) -> ScheduleOutcome {
        match ctx.timeline.pop_oldest() {
            Some(req) => {
                let req = finalize_dispatch(ctx.hashtable, ctx.current_filenb, req, ctx.now_ns);
                ScheduleOutcome::Dispatched(Batch::from_request(req))
            }
            None => ScheduleOutcome::Idle { sleep_hint_ns: 0 },
        }
    }
}
