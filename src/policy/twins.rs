//! TWINS: round-robins through `multi_timeline[queue_id]` one window at a
//! time, dispatching only the current window's queue. Ported from
//! `original_source/src/TWINS.c` (`g_current_twins_server`, `g_window_start`).

use parking_lot::Mutex;

use crate::dispatch::Batch;
use crate::policy::{finalize_dispatch, PolicyId, ScheduleOutcome, SchedulingContext, SchedulingPolicy};

struct TwinsState {
    current_queue: u32,
    window_start_ns: i64,
}

pub struct Twins {
    state: Mutex<TwinsState>,
    max_queue_id: u32,
    window_ns: i64,
}

impl Twins {
    pub fn new(max_queue_id: u32, window_ns: i64) -> Self {
        Twins {
            state: Mutex::new(TwinsState { current_queue: 0, window_start_ns: 0 }),
            max_queue_id,
            window_ns,
        }
    }
}

impl SchedulingPolicy for Twins {
    fn id(&self) -> PolicyId {
        PolicyId::Twins
    }

    fn uses_hashtable(&self) -> bool {
        false
    }

    fn max_aggregation(&self) -> usize {
        1
    }

    fn schedule(&self, ctx: &SchedulingContext) -> ScheduleOutcome {
        let mut state = self.state.lock();
        let elapsed = ctx.now_ns - state.window_start_ns;
        if elapsed >= self.window_ns {
            state.current_queue = (state.current_queue + 1) % (self.max_queue_id + 1);
            state.window_start_ns = ctx.now_ns;
        }
        let queue_id = state.current_queue;
        let remaining = self.window_ns - (ctx.now_ns - state.window_start_ns);
        drop(state);

        match ctx.timeline.pop_from_queue(queue_id) {
            Some(req) => {
                let req = finalize_dispatch(ctx.hashtable, ctx.current_filenb, req, ctx.now_ns);
                ScheduleOutcome::Dispatched(Batch::from_request(req))
            }
            None => ScheduleOutcome::Idle { sleep_hint_ns: remaining.max(0) },
        }
    }
}
