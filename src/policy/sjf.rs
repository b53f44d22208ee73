//! Shortest Job First: scans every file's pending requests, briefly
//! locking each hashtable bucket in turn, and dispatches the single
//! smallest one found. Ported from
//! `original_source/src/SJF.c` (`SJF_check_queue`, `SJF_get_shortest_job`).
//! The scan-then-relock race (the chosen request's queue may have changed
//! by the time its bucket is relocked to pop it) is accepted as-is,
//! matching the source.

use std::sync::atomic::Ordering;

use crate::dispatch::Batch;
use crate::policy::{PolicyId, ScheduleOutcome, SchedulingContext, SchedulingPolicy};
use crate::request::RequestType;

pub struct Sjf;

impl SchedulingPolicy for Sjf {
    fn id(&self) -> PolicyId {
        PolicyId::Sjf
    }

    fn uses_hashtable(&self) -> bool {
        true
    }

    fn max_aggregation(&self) -> usize {
        1
    }

    fn schedule(&self, ctx: &SchedulingContext) -> ScheduleOutcome {
        let mut best: Option<(String, RequestType, u64, u64)> = None;

        ctx.hashtable.for_each_file(|file| {
            for req_type in [RequestType::Read, RequestType::Write] {
                for req in &file.queue(req_type).pending {
                    let shorter = match &best {
                        Some((_, _, _, len)) => req.length() < *len,
                        None => true,
                    };
                    if shorter {
                        best = Some((file.file_id.clone(), req_type, req.offset(), req.length()));
                    }
                }
            }
            None::<()>
        });

        let Some((file_id, req_type, offset, length)) = best else {
            return ScheduleOutcome::Idle { sleep_hint_ns: 0 };
        };

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
            Some((req, became_idle))
        });

        match dispatched.flatten() {
            Some((req, became_idle)) => {
                if became_idle {
                    ctx.current_filenb.fetch_sub(1, Ordering::SeqCst);
                }
                ScheduleOutcome::Dispatched(Batch::from_request(req))
            }
            // The chosen request was gone by the time we relocked its
            // bucket (race accepted per source behavior); retry immediately.
            None => ScheduleOutcome::Idle { sleep_hint_ns: 0 },
        }
    }
}
