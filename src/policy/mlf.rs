//! Multi-Level Feedback: dispatches the first pending request eligible
//! under the global quantum rule (`length <= sched_factor * quantum`); if
//! none are eligible, every pending request's `sched_factor` is bumped
//! and the caller is asked to retry immediately. Shares the waiting-times
//! module (`waiting.rs`) with aIOLi: a file that is currently waiting is
//! skipped, and if a whole sweep finds nothing to dispatch because every
//! file with pending work is waiting, the shortest remaining wait is
//! returned as a sleep hint instead of busy-retrying. Ported from
//! `original_source/src/MLF.c`.

use std::sync::atomic::Ordering;

use crate::dispatch::Batch;
use crate::policy::{PolicyId, ScheduleOutcome, SchedulingContext, SchedulingPolicy};
use crate::request::RequestType;
use crate::waiting::{waiting_algorithms_postprocess, DEFAULT_WAITING_TIME_NS};

/// Fixed quantum MLF compares request lengths against, matching the
/// source's `config_quantum` default (8 MiB chunks of a typical trace).
pub const MLF_QUANTUM: u64 = 8192;

pub struct Mlf;

impl SchedulingPolicy for Mlf {
    fn id(&self) -> PolicyId {
        PolicyId::Mlf
    }

    fn uses_hashtable(&self) -> bool {
        true
    }

    fn max_aggregation(&self) -> usize {
        16
    }

    fn schedule(&self, ctx: &SchedulingContext) -> ScheduleOutcome {
        let mut found: Option<(String, RequestType, u64, u64)> = None;
        let mut any_pending = false;
        let mut min_wait_remaining: Option<i64> = None;

        ctx.hashtable.for_each_file(|file| {
            if file.is_waiting(ctx.now_ns) {
                if let Some(until) = file.waiting_until_ns {
                    let remaining = until - ctx.now_ns;
                    min_wait_remaining = Some(match min_wait_remaining {
                        Some(cur) => cur.min(remaining),
                        None => remaining,
                    });
                }
                return None;
            }
            for req_type in [RequestType::Read, RequestType::Write] {
                for req in &file.queue(req_type).pending {
                    any_pending = true;
                    if req.is_eligible(MLF_QUANTUM) {
                        found = Some((file.file_id.clone(), req_type, req.offset(), req.length()));
                        return Some(());
                    }
                }
            }
            None
        });

        if let Some((file_id, req_type, offset, length)) = found {
            let dispatched = ctx.hashtable.with_existing_file(&file_id, |file| {
                let req = {
                    let queue = file.queue_mut(req_type);
                    let idx = queue
                        .pending
                        .iter()
                        .position(|r| r.offset() == offset && r.length() == length)?;
                    queue.move_to_dispatch(idx, ctx.now_ns)
                };
                let became_idle = file.release_pending(req.reqnb() as u64);
                waiting_algorithms_postprocess(file, req_type, offset, length, ctx.now_ns, DEFAULT_WAITING_TIME_NS);
                Some((req, became_idle))
            });
            if let Some((req, became_idle)) = dispatched.flatten() {
                if became_idle {
                    ctx.current_filenb.fetch_sub(1, Ordering::SeqCst);
                }
                return ScheduleOutcome::Dispatched(Batch::from_request(req));
            }
            return ScheduleOutcome::Idle { sleep_hint_ns: 0 };
        }

        if any_pending {
            // Nothing eligible yet among non-waiting files: age every
            // pending request so it gets closer to eligibility, then ask
            // the caller to retry at once.
            ctx.hashtable.for_each_file(|file| {
                if file.is_waiting(ctx.now_ns) {
                    return None::<()>;
                }
                for req_type in [RequestType::Read, RequestType::Write] {
                    for req in file.queue_mut(req_type).pending.iter_mut() {
                        req.increment_sched_factor();
                    }
                }
                None
            });
            ScheduleOutcome::Idle { sleep_hint_ns: 0 }
        } else {
            // Every file with pending work (if any) is waiting: sleep
            // until the soonest one's wait expires instead of spinning.
            ScheduleOutcome::Idle { sleep_hint_ns: min_wait_remaining.unwrap_or(0).max(0) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashtable::Hashtable;
    use crate::request::{Request, SimpleRequest};
    use crate::timeline::Timeline;
    use std::sync::atomic::AtomicI64;

    fn simple(offset: u64, length: u64, sched_factor: u32) -> Request {
        Request::Simple(SimpleRequest {
            file_id: "f".into(),
            req_type: RequestType::Read,
            offset,
            length,
            user_id: offset,
            queue_id: 0,
            arrival_time: 0,
            dispatch_time: None,
            timestamp: 0,
            sched_factor,
            sw_priority: 0,
            callback: None,
        })
    }

    fn ctx_for<'a>(hashtable: &'a Hashtable, timeline: &'a Timeline, current_filenb: &'a AtomicI64, now_ns: i64) -> SchedulingContext<'a> {
        SchedulingContext { hashtable, timeline, now_ns, current_filenb }
    }

    #[test]
    fn eligible_request_is_dispatched() {
        let ht = Hashtable::new();
        ht.with_file_or_insert("f", MLF_QUANTUM, |file| {
            file.read_queue.pending.push(simple(0, 100, 1));
            file.pending_reqnb = 1;
        });
        let timeline = Timeline::new(0);
        let current_filenb = AtomicI64::new(1);
        let ctx = ctx_for(&ht, &timeline, &current_filenb, 0);

        match Mlf.schedule(&ctx) {
            ScheduleOutcome::Dispatched(batch) => assert_eq!(batch.user_ids, vec![0]),
            ScheduleOutcome::Idle { .. } => panic!("expected a dispatch"),
        }
        assert_eq!(current_filenb.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn ineligible_requests_get_aged_and_retried() {
        let ht = Hashtable::new();
        ht.with_file_or_insert("f", MLF_QUANTUM, |file| {
            // sched_factor 0 makes every nonzero-length request ineligible.
            file.read_queue.pending.push(simple(0, 100, 0));
            file.pending_reqnb = 1;
        });
        let timeline = Timeline::new(0);
        let current_filenb = AtomicI64::new(1);
        let ctx = ctx_for(&ht, &timeline, &current_filenb, 0);

        match Mlf.schedule(&ctx) {
            ScheduleOutcome::Idle { sleep_hint_ns } => assert_eq!(sleep_hint_ns, 0),
            ScheduleOutcome::Dispatched(_) => panic!("sched_factor 0 must not be eligible"),
        }
        let factor = ht
            .with_existing_file("f", |file| file.read_queue.pending[0].sched_factor())
            .unwrap();
        assert_eq!(factor, 1);
    }

    #[test]
    fn waiting_file_is_skipped_and_returns_its_remaining_wait() {
        let ht = Hashtable::new();
        ht.with_file_or_insert("f", MLF_QUANTUM, |file| {
            file.read_queue.pending.push(simple(0, 100, 1));
            file.pending_reqnb = 1;
            file.waiting_until_ns = Some(5_000);
        });
        let timeline = Timeline::new(0);
        let current_filenb = AtomicI64::new(1);
        let ctx = ctx_for(&ht, &timeline, &current_filenb, 1_000);

        match Mlf.schedule(&ctx) {
            ScheduleOutcome::Idle { sleep_hint_ns } => assert_eq!(sleep_hint_ns, 4_000),
            ScheduleOutcome::Dispatched(_) => panic!("waiting file must not be dispatched from"),
        }
    }

    #[test]
    fn no_pending_work_anywhere_yields_zero_hint() {
        let ht = Hashtable::new();
        let timeline = Timeline::new(0);
        let current_filenb = AtomicI64::new(0);
        let ctx = ctx_for(&ht, &timeline, &current_filenb, 0);

        match Mlf.schedule(&ctx) {
            ScheduleOutcome::Idle { sleep_hint_ns } => assert_eq!(sleep_hint_ns, 0),
            ScheduleOutcome::Dispatched(_) => panic!("nothing to dispatch"),
        }
    }
}
