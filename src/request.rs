//! The request model: a sum type distinguishing `Simple` requests from the
//! `Virtual` aggregates the aggregation engine (`aggregation.rs`) builds out
//! of them, per the source's `request_t` with its `reqnb`/`reqs_list` fields
//! re-expressed as an explicit enum instead of a fake-polymorphic struct.

use std::sync::Arc;

/// A callback specific to a single request, provided at `add_request` time.
/// Stands in for the source's `(*callback)(int64_t req_id, void *user_info)`
/// function pointer plus opaque `user_info`.
pub type PerRequestCallback = Arc<dyn Fn(u64) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestType {
    Read,
    Write,
}

/// A single, unaggregated request. Also the element type stored inside a
/// `Virtual`'s `children`.
#[derive(Clone)]
pub struct SimpleRequest {
    pub file_id: String,
    pub req_type: RequestType,
    pub offset: u64,
    pub length: u64,
    pub user_id: u64,
    pub queue_id: u32,
    pub arrival_time: i64,
    pub dispatch_time: Option<i64>,
    pub timestamp: u64,
    pub sched_factor: u32,
    pub sw_priority: i64,
    pub callback: Option<PerRequestCallback>,
}

impl SimpleRequest {
    pub fn end_offset(&self) -> u64 {
        self.offset + self.length
    }

    /// True when `self` and `other` are contiguous: same file, same
    /// direction, and `self.offset <= other.offset <= self.end_offset()`.
    /// Ported from the `CHECK_AGGREGATE` macro in `agios_add_request.c`.
    pub fn contiguous_with(&self, other: &SimpleRequest) -> bool {
        self.file_id == other.file_id
            && self.req_type == other.req_type
            && self.offset <= other.offset
            && other.offset <= self.end_offset()
    }
}

/// The header fields shared by a `Virtual` request and a `Simple` one; kept
/// as a separate struct so `include`/`join` in `aggregation.rs` can update
/// them without re-deriving the variant's discriminant each time.
#[derive(Clone)]
pub struct VirtualRequest {
    pub file_id: String,
    pub req_type: RequestType,
    pub offset: u64,
    pub length: u64,
    pub queue_id: u32,
    pub arrival_time: i64,
    pub dispatch_time: Option<i64>,
    pub timestamp: u64,
    pub sched_factor: u32,
    pub children: Vec<SimpleRequest>,
}

impl VirtualRequest {
    pub fn end_offset(&self) -> u64 {
        self.offset + self.length
    }

    pub fn reqnb(&self) -> usize {
        self.children.len()
    }
}

#[derive(Clone)]
pub enum Request {
    Simple(SimpleRequest),
    Virtual(VirtualRequest),
}

impl Request {
    pub fn file_id(&self) -> &str {
        match self {
            Request::Simple(r) => &r.file_id,
            Request::Virtual(r) => &r.file_id,
        }
    }

    pub fn req_type(&self) -> RequestType {
        match self {
            Request::Simple(r) => r.req_type,
            Request::Virtual(r) => r.req_type,
        }
    }

    pub fn offset(&self) -> u64 {
        match self {
            Request::Simple(r) => r.offset,
            Request::Virtual(r) => r.offset,
        }
    }

    pub fn length(&self) -> u64 {
        match self {
            Request::Simple(r) => r.length,
            Request::Virtual(r) => r.length,
        }
    }

    pub fn end_offset(&self) -> u64 {
        self.offset() + self.length()
    }

    pub fn queue_id(&self) -> u32 {
        match self {
            Request::Simple(r) => r.queue_id,
            Request::Virtual(r) => r.queue_id,
        }
    }

    pub fn arrival_time(&self) -> i64 {
        match self {
            Request::Simple(r) => r.arrival_time,
            Request::Virtual(r) => r.arrival_time,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            Request::Simple(r) => r.timestamp,
            Request::Virtual(r) => r.timestamp,
        }
    }

    pub fn sched_factor(&self) -> u32 {
        match self {
            Request::Simple(r) => r.sched_factor,
            Request::Virtual(r) => r.sched_factor,
        }
    }

    pub fn dispatch_time(&self) -> Option<i64> {
        match self {
            Request::Simple(r) => r.dispatch_time,
            Request::Virtual(r) => r.dispatch_time,
        }
    }

    pub fn set_dispatch_time(&mut self, t: i64) {
        match self {
            Request::Simple(r) => r.dispatch_time = Some(t),
            Request::Virtual(r) => r.dispatch_time = Some(t),
        }
    }

    pub fn reqnb(&self) -> usize {
        match self {
            Request::Simple(_) => 1,
            Request::Virtual(r) => r.reqnb(),
        }
    }

    /// Sort key enforcing invariant 6 (offset, then length order).
    pub fn sort_key(&self) -> (u64, u64) {
        (self.offset(), self.length())
    }

    /// Increments `sched_factor`: `0 -> 1`, else doubling. Ported from
    /// `waiting_common.c::increment_sched_factor`.
    pub fn increment_sched_factor(&mut self) {
        let factor = match self {
            Request::Simple(r) => &mut r.sched_factor,
            Request::Virtual(r) => &mut r.sched_factor,
        };
        *factor = if *factor == 0 { 1 } else { *factor << 1 };
    }

    /// Is this request eligible under the MLF/aIOLi quantum rule
    /// `length <= sched_factor * quantum`?
    pub fn is_eligible(&self, quantum: u64) -> bool {
        self.length() <= (self.sched_factor() as u64) * quantum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple(offset: u64, length: u64) -> SimpleRequest {
        SimpleRequest {
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
        }
    }

    #[test]
    fn contiguity_allows_overlap_and_touch() {
        let a = simple(0, 100);
        let touching = simple(100, 50);
        let overlapping = simple(50, 50);
        let gapped = simple(200, 50);
        assert!(a.contiguous_with(&touching));
        assert!(a.contiguous_with(&overlapping));
        assert!(!a.contiguous_with(&gapped));
    }

    #[test]
    fn sched_factor_doubles() {
        let mut r = Request::Simple(simple(0, 1));
        assert_eq!(r.sched_factor(), 0);
        r.increment_sched_factor();
        assert_eq!(r.sched_factor(), 1);
        r.increment_sched_factor();
        assert_eq!(r.sched_factor(), 2);
        r.increment_sched_factor();
        assert_eq!(r.sched_factor(), 4);
    }

    #[test]
    fn eligibility_rule() {
        let mut r = Request::Simple(simple(0, 20000));
        r.increment_sched_factor(); // 1
        assert!(!r.is_eligible(8192)); // 8192 < 20000
        for _ in 0..2 {
            r.increment_sched_factor();
        } // 4
        assert!(r.is_eligible(8192)); // 32768 >= 20000
    }
}
