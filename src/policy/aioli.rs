//! aIOLi: like MLF but the quantum is per-queue and adapts via the
//! waiting-times module (`waiting.rs`) instead of a single global value.
//! Each visit to a queue dispatches its first pending request
//! unconditionally, then keeps adding more while the running total stays
//! within the queue's current quantum, and finally grows or shrinks that
//! quantum for next time based on how much of it got used. Ported from
//! `original_source/src/aIOLi.c`.

use std::sync::atomic::Ordering;

use crate::dispatch::Batch;
use crate::policy::mlf::MLF_QUANTUM;
use crate::policy::{PolicyId, ScheduleOutcome, SchedulingContext, SchedulingPolicy};
use crate::request::{Request, RequestType};
use crate::waiting::{waiting_algorithms_postprocess, DEFAULT_WAITING_TIME_NS};

/// Floor a queue's adaptive quantum never shrinks past, matching the
/// engine's initial per-file quantum.
pub const DEFAULT_QUANTUM: u64 = MLF_QUANTUM;

/// Ceiling a queue's adaptive quantum never grows past, ported from
/// `aIOLi.c`'s `MAX_AGGREG_SIZE`.
pub const MAX_AGGREG_SIZE: u64 = 1 << 20;

pub struct Aioli;

impl SchedulingPolicy for Aioli {
    fn id(&self) -> PolicyId {
        PolicyId::Aioli
    }

    fn uses_hashtable(&self) -> bool {
        true
    }

    fn max_aggregation(&self) -> usize {
        16
    }

    fn schedule(&self, ctx: &SchedulingContext) -> ScheduleOutcome {
        let mut found: Option<(String, RequestType)> = None;

        ctx.hashtable.for_each_file(|file| {
            if file.is_waiting(ctx.now_ns) {
                return None;
            }
            for req_type in [RequestType::Read, RequestType::Write] {
                if !file.queue(req_type).pending.is_empty() {
                    found = Some((file.file_id.clone(), req_type));
                    return Some(());
                }
            }
            None
        });

        let Some((file_id, req_type)) = found else {
            return ScheduleOutcome::Idle { sleep_hint_ns: 0 };
        };

        let dispatched = ctx.hashtable.with_existing_file(&file_id, |file| {
            let (requests, last_offset, last_length) = {
                let queue = file.queue_mut(req_type);
                if queue.pending.is_empty() {
                    return None;
                }
                let current_quantum = queue.next_quantum.max(1);
                let mut used_quantum: u64 = 0;
                let mut requests: Vec<Request> = Vec::new();

                // The first request of a visit is always dispatched,
                // regardless of how it compares to the quantum.
                let first = queue.move_to_dispatch(0, ctx.now_ns);
                used_quantum += first.length();
                requests.push(first);

                while let Some(next) = queue.pending.first() {
                    let next_length = next.length();
                    if used_quantum + next_length > current_quantum {
                        break;
                    }
                    let req = queue.move_to_dispatch(0, ctx.now_ns);
                    used_quantum += req.length();
                    requests.push(req);
                }

                let usage_pct = used_quantum.saturating_mul(100) / current_quantum;
                let adjusted = if usage_pct >= 175 {
                    current_quantum.saturating_mul(2)
                } else if usage_pct >= 125 {
                    current_quantum + current_quantum / 2
                } else if usage_pct >= 75 {
                    current_quantum
                } else {
                    current_quantum / 2
                };
                queue.next_quantum = adjusted.clamp(DEFAULT_QUANTUM, MAX_AGGREG_SIZE);

                let last = requests.last().expect("at least the guaranteed first request was dispatched");
                let (last_offset, last_length) = (last.offset(), last.length());
                (requests, last_offset, last_length)
            };

            let served: u64 = requests.iter().map(|r| r.reqnb() as u64).sum();
            let became_idle = file.release_pending(served);
            waiting_algorithms_postprocess(file, req_type, last_offset, last_length, ctx.now_ns, DEFAULT_WAITING_TIME_NS);
            Some((requests, became_idle))
        });

        match dispatched.flatten() {
            Some((requests, became_idle)) => {
                if became_idle {
                    ctx.current_filenb.fetch_sub(1, Ordering::SeqCst);
                }
                ScheduleOutcome::Dispatched(Batch::from_requests(requests))
            }
            None => ScheduleOutcome::Idle { sleep_hint_ns: 0 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashtable::Hashtable;
    use crate::request::{RequestType, SimpleRequest};
    use crate::timeline::Timeline;
    use std::sync::atomic::AtomicI64;

    fn simple(offset: u64, length: u64) -> Request {
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
            sched_factor: 0,
            sw_priority: 0,
            callback: None,
        })
    }

    fn ctx_for<'a>(hashtable: &'a Hashtable, timeline: &'a Timeline, current_filenb: &'a AtomicI64, now_ns: i64) -> SchedulingContext<'a> {
        SchedulingContext { hashtable, timeline, now_ns, current_filenb }
    }

    #[test]
    fn first_request_of_a_visit_dispatches_unconditionally() {
        let ht = Hashtable::new();
        ht.with_file_or_insert("f", DEFAULT_QUANTUM, |file| {
            file.read_queue.next_quantum = 100;
            file.read_queue.pending.push(simple(0, 9999));
            file.pending_reqnb = 1;
        });
        let timeline = Timeline::new(0);
        let current_filenb = AtomicI64::new(1);
        let ctx = ctx_for(&ht, &timeline, &current_filenb, 0);

        match Aioli.schedule(&ctx) {
            ScheduleOutcome::Dispatched(batch) => assert_eq!(batch.user_ids, vec![0]),
            ScheduleOutcome::Idle { .. } => panic!("expected a dispatch"),
        }
        assert_eq!(current_filenb.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn quantum_grows_when_usage_is_high() {
        let ht = Hashtable::new();
        ht.with_file_or_insert("f", DEFAULT_QUANTUM, |file| {
            file.read_queue.next_quantum = 10_000;
            file.read_queue.pending.push(simple(0, 20_000));
            file.pending_reqnb = 1;
        });
        let timeline = Timeline::new(0);
        let current_filenb = AtomicI64::new(1);
        let ctx = ctx_for(&ht, &timeline, &current_filenb, 0);

        Aioli.schedule(&ctx);

        // 20000 / 10000 = 200% usage, clears the >=175% rung: quantum doubles.
        let next_quantum = ht.with_existing_file("f", |file| file.read_queue.next_quantum).unwrap();
        assert_eq!(next_quantum, 20_000);
    }

    #[test]
    fn quantum_shrinks_when_usage_is_low() {
        let ht = Hashtable::new();
        ht.with_file_or_insert("f", DEFAULT_QUANTUM, |file| {
            file.read_queue.next_quantum = 1000;
            file.read_queue.pending.push(simple(0, 100));
            file.pending_reqnb = 1;
        });
        let timeline = Timeline::new(0);
        let current_filenb = AtomicI64::new(1);
        let ctx = ctx_for(&ht, &timeline, &current_filenb, 0);

        Aioli.schedule(&ctx);

        // 100 / 1000 = 10% usage, below the >=75% rung: quantum halves, but
        // never below DEFAULT_QUANTUM.
        let next_quantum = ht.with_existing_file("f", |file| file.read_queue.next_quantum).unwrap();
        assert_eq!(next_quantum, 500.max(DEFAULT_QUANTUM));
    }

    #[test]
    fn multiple_requests_dispatch_while_within_quantum() {
        let ht = Hashtable::new();
        ht.with_file_or_insert("f", DEFAULT_QUANTUM, |file| {
            file.read_queue.next_quantum = 1000;
            file.read_queue.pending.push(simple(0, 100));
            file.read_queue.pending.push(simple(100, 100));
            file.read_queue.pending.push(simple(200, 100));
            file.pending_reqnb = 3;
        });
        let timeline = Timeline::new(0);
        let current_filenb = AtomicI64::new(1);
        let ctx = ctx_for(&ht, &timeline, &current_filenb, 0);

        match Aioli.schedule(&ctx) {
            ScheduleOutcome::Dispatched(batch) => assert_eq!(batch.user_ids, vec![0, 100, 200]),
            ScheduleOutcome::Idle { .. } => panic!("expected a dispatch"),
        }
        let pending_left = ht.with_existing_file("f", |file| file.read_queue.pending.len()).unwrap();
        assert_eq!(pending_left, 0);
    }

    #[test]
    fn waiting_file_is_skipped() {
        let ht = Hashtable::new();
        ht.with_file_or_insert("f", DEFAULT_QUANTUM, |file| {
            file.read_queue.pending.push(simple(0, 10));
            file.pending_reqnb = 1;
            file.waiting_until_ns = Some(1_000_000);
        });
        let timeline = Timeline::new(0);
        let current_filenb = AtomicI64::new(1);
        let ctx = ctx_for(&ht, &timeline, &current_filenb, 0);

        match Aioli.schedule(&ctx) {
            ScheduleOutcome::Idle { sleep_hint_ns } => assert_eq!(sleep_hint_ns, 0),
            ScheduleOutcome::Dispatched(_) => panic!("waiting file must not be dispatched from"),
        }
    }
}
