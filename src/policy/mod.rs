//! The `SchedulingPolicy` trait and the eight policies implementing it.
//! One policy is active at a time; the engine resolves it once per outer
//! loop iteration rather than per request, per the source's
//! `current_scheduler` global.

pub mod aioli;
pub mod mlf;
pub mod noop;
pub mod sjf;
pub mod to;
pub mod twins;
pub mod wfq;

use std::sync::atomic::{AtomicI64, Ordering};

use crate::dispatch::Batch;
use crate::hashtable::Hashtable;
use crate::timeline::Timeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyId {
    Noop,
    To,
    ToAgg,
    Sw,
    Sjf,
    Mlf,
    Aioli,
    Twins,
    Wfq,
}

impl PolicyId {
    pub fn name(self) -> &'static str {
        match self {
            PolicyId::Noop => "NOOP",
            PolicyId::To => "TO",
            PolicyId::ToAgg => "TO-agg",
            PolicyId::Sw => "SW",
            PolicyId::Sjf => "SJF",
            PolicyId::Mlf => "MLF",
            PolicyId::Aioli => "aIOLi",
            PolicyId::Twins => "TWINS",
            PolicyId::Wfq => "WFQ",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "NOOP" => PolicyId::Noop,
            "TO" => PolicyId::To,
            "TO-agg" => PolicyId::ToAgg,
            "SW" => PolicyId::Sw,
            "SJF" => PolicyId::Sjf,
            "MLF" => PolicyId::Mlf,
            "aIOLi" => PolicyId::Aioli,
            "TWINS" => PolicyId::Twins,
            "WFQ" => PolicyId::Wfq,
            _ => return None,
        })
    }
}

/// Result of one `schedule()` invocation.
pub enum ScheduleOutcome {
    /// A batch was dispatched; the caller should run `dispatch::phase2` on
    /// it with no locks held, then call `schedule()` again immediately.
    Dispatched(Batch),
    /// Nothing was eligible to dispatch right now. `sleep_hint_ns` is the
    /// source's `schedule()` return value: `0` means retry immediately,
    /// `>0` means the caller may sleep up to that long (interruptibly for
    /// TWINS/WFQ, uninterruptibly otherwise).
    Idle { sleep_hint_ns: i64 },
}

/// Shared read-only context every policy's `schedule` runs against.
pub struct SchedulingContext<'a> {
    pub hashtable: &'a Hashtable,
    pub timeline: &'a Timeline,
    pub now_ns: i64,
    /// Global count of files with at least one pending request (invariant
    /// 4); policies decrement it themselves when a dispatch or cancel
    /// drives a file's `pending_reqnb` to zero.
    pub current_filenb: &'a AtomicI64,
}

pub trait SchedulingPolicy: Send + Sync {
    fn id(&self) -> PolicyId;

    /// Whether requests for this policy are stored/ordered in the 64-bucket
    /// hashtable (`true`) or the global/multi timeline (`false`).
    fn uses_hashtable(&self) -> bool;

    /// Cap on aggregated-request size: 1 (no aggregation) or 16, per spec §4.
    fn max_aggregation(&self) -> usize;

    /// Is this policy eligible for automatic selection under dynamic mode?
    /// All eight are; kept as a hook for future narrowing.
    fn is_dynamic_candidate(&self) -> bool {
        true
    }

    fn schedule(&self, ctx: &SchedulingContext) -> ScheduleOutcome;
}

/// Stamps `req`'s dispatch timestamp, moves it into its file's dispatch
/// list (splitting a `Virtual` into its simple children, same as
/// `Queue::move_to_dispatch`) and decrements the file's pending counter,
/// ported from `process_request.c::put_this_request_in_dispatch`. Shared
/// by every timeline-based policy's `schedule` implementation.
pub fn finalize_dispatch(
    hashtable: &Hashtable,
    current_filenb: &AtomicI64,
    mut req: crate::request::Request,
    now_ns: i64,
) -> crate::request::Request {
    req.set_dispatch_time(now_ns);
    hashtable.with_existing_file(req.file_id(), |file| {
        let queue = file.queue_mut(req.req_type());
        queue.stats.on_aggregation(req.reqnb() as i64);
        match &req {
            crate::request::Request::Simple(_) => queue.dispatch.push(req.clone()),
            crate::request::Request::Virtual(v) => {
                for child in &v.children {
                    let mut child_req = crate::request::Request::Simple(child.clone());
                    child_req.set_dispatch_time(now_ns);
                    queue.dispatch.push(child_req);
                }
            }
        }
        if file.release_pending(req.reqnb() as u64) {
            current_filenb.fetch_sub(1, Ordering::SeqCst);
        }
    });
    req
}
