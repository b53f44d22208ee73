//! TO, TO-agg and SW all dispatch the oldest timeline entry in a tight
//! loop; they differ only in how requests were *inserted* into the
//! timeline (plain FIFO for TO, in-place aggregation for TO-agg,
//! `sw_priority` order for SW — all handled by `timeline.rs` at insertion
//! time, not here). Ported from `original_source/src/TO.c` and `SW.c`
//! ("SW literally calls `timeorder()`").

use crate::dispatch::Batch;
use crate::policy::{finalize_dispatch, PolicyId, ScheduleOutcome, SchedulingContext, SchedulingPolicy};

pub struct TimeOrder {
    id: PolicyId,
    max_aggregation: usize,
}

impl TimeOrder {
    pub fn to() -> Self {
        TimeOrder { id: PolicyId::To, max_aggregation: 1 }
    }

    pub fn to_agg() -> Self {
        TimeOrder { id: PolicyId::ToAgg, max_aggregation: 16 }
    }

    pub fn sw() -> Self {
        TimeOrder { id: PolicyId::Sw, max_aggregation: 1 }
    }
}

impl SchedulingPolicy for TimeOrder {
    fn id(&self) -> PolicyId {
        self.id
    }

    fn uses_hashtable(&self) -> bool {
        false
    }

    fn max_aggregation(&self) -> usize {
        self.max_aggregation
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
