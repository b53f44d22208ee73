//! Request aggregation: merging contiguous same-file, same-direction
//! requests into a `Virtual`, and splitting one back apart on cancel.
//! Ported from `original_source/src/agios_add_request.c`
//! (`include_in_aggregation`, `join_aggregations`, `make_virtual_request`)
//! and `agios_cancel_request.c`'s child-removal/recompute algorithm.

use crate::request::{Request, SimpleRequest, VirtualRequest};

/// Tries to merge `incoming` into `existing`. Returns `None` on success
/// (merged into `existing` in place), or `Some(incoming)` unchanged if the
/// two aren't contiguous or `existing` is already at `max_aggregation`.
/// Ported from `include_in_aggregation`.
pub fn include(existing: &mut Request, incoming: Request, max_aggregation: usize) -> Option<Request> {
    if existing.reqnb() >= max_aggregation {
        return Some(incoming);
    }
    match existing {
        Request::Simple(head) => {
            let Request::Simple(ref tail) = incoming else {
                return Some(incoming);
            };
            if !head.contiguous_with(tail) {
                return Some(incoming);
            }
            let merged = make_virtual(head.clone(), tail.clone());
            *existing = Request::Virtual(merged);
            None
        }
        Request::Virtual(v) => {
            let Request::Simple(tail) = incoming else {
                return Some(incoming);
            };
            let last = v.children.last().expect("virtual always has >=2 children");
            if !last.contiguous_with(&tail) {
                return Some(incoming);
            }
            extend_virtual(v, tail);
            None
        }
    }
}

/// Builds a fresh `Virtual` out of two contiguous simple requests, ported
/// from `make_virtual_request`.
fn make_virtual(head: SimpleRequest, tail: SimpleRequest) -> VirtualRequest {
    let offset = head.offset.min(tail.offset);
    let end = head.end_offset().max(tail.end_offset());
    VirtualRequest {
        file_id: head.file_id.clone(),
        req_type: head.req_type,
        offset,
        length: end - offset,
        queue_id: head.queue_id,
        arrival_time: head.arrival_time.min(tail.arrival_time),
        dispatch_time: None,
        timestamp: head.timestamp.min(tail.timestamp),
        sched_factor: 0,
        children: vec![head, tail],
    }
}

/// Widens `v`'s bounds to include `tail` and appends it as a new child.
fn extend_virtual(v: &mut VirtualRequest, tail: SimpleRequest) {
    let offset = v.offset.min(tail.offset);
    let end = v.end_offset().max(tail.end_offset());
    v.offset = offset;
    v.length = end - offset;
    v.arrival_time = v.arrival_time.min(tail.arrival_time);
    v.timestamp = v.timestamp.min(tail.timestamp);
    v.children.push(tail);
}

/// Joins two already-built virtual (or simple) aggregations into one,
/// ported from `join_aggregations` (used when two adjacent in-timeline
/// aggregations become contiguous after a later request fills the gap).
pub fn join(a: Request, b: Request, max_aggregation: usize) -> (Request, Option<Request>) {
    if a.reqnb() + b.reqnb() > max_aggregation {
        return (a, Some(b));
    }
    let mut children = match a {
        Request::Simple(s) => vec![s],
        Request::Virtual(v) => v.children,
    };
    let b_children = match b {
        Request::Simple(s) => vec![s],
        Request::Virtual(v) => v.children,
    };
    children.extend(b_children);

    let offset = children.iter().map(|c| c.offset).min().unwrap();
    let end = children.iter().map(|c| c.end_offset()).max().unwrap();
    let arrival_time = children.iter().map(|c| c.arrival_time).min().unwrap();
    let timestamp = children.iter().map(|c| c.timestamp).min().unwrap();
    let head = &children[0];
    let merged = VirtualRequest {
        file_id: head.file_id.clone(),
        req_type: head.req_type,
        offset,
        length: end - offset,
        queue_id: head.queue_id,
        arrival_time,
        dispatch_time: None,
        timestamp,
        sched_factor: 0,
        children,
    };
    (Request::Virtual(merged), None)
}

/// Outcome of removing one child from a virtual request.
pub enum AfterRemoval {
    /// The virtual still has 2+ children; bounds were recomputed from
    /// scratch over the remainder.
    StillVirtual(VirtualRequest),
    /// Only one child remained, so the virtual is dissolved back into it.
    Dissolved(SimpleRequest),
}

/// Removes the child at `offset`/`length` from `v` and recomputes bounds
/// from scratch over the remaining children, exactly as
/// `agios_cancel_request.c` does rather than shrinking bounds
/// incrementally. Returns `None` if no matching child was found.
pub fn remove_child(mut v: VirtualRequest, offset: u64, length: u64) -> Option<AfterRemoval> {
    let idx = v
        .children
        .iter()
        .position(|c| c.offset == offset && c.length == length)?;
    v.children.remove(idx);

    if v.children.len() == 1 {
        return Some(AfterRemoval::Dissolved(v.children.into_iter().next().unwrap()));
    }

    let mut first = true;
    let (mut offset, mut end, mut arrival_time, mut timestamp) = (0u64, 0u64, 0i64, 0u64);
    for child in &v.children {
        if first {
            offset = child.offset;
            end = child.end_offset();
            arrival_time = child.arrival_time;
            timestamp = child.timestamp;
            first = false;
        } else {
            offset = offset.min(child.offset);
            end = end.max(child.end_offset());
            arrival_time = arrival_time.min(child.arrival_time);
            timestamp = timestamp.min(child.timestamp);
        }
    }
    v.offset = offset;
    v.length = end - offset;
    v.arrival_time = arrival_time;
    v.timestamp = timestamp;
    Some(AfterRemoval::StillVirtual(v))
}

/// Inserts `req` into `pending` (kept sorted by `(offset, length)`),
/// merging it into a contiguous neighbor on either side, and joining those
/// two neighbors into one aggregation if `req` was the piece bridging the
/// gap between them. Ported from the full `CHECK_AGGREGATE` scan over a
/// file's sorted request list in `agios_add_request.c::insert_aggregations`.
/// Returns the `reqnb` of whichever entry `req` ended up folded into, for
/// the waiting-times module's arrival-time priming.
pub fn insert_with_aggregation(pending: &mut Vec<Request>, req: Request, max_aggregation: usize) -> i64 {
    let pos = pending.partition_point(|existing| existing.sort_key() <= req.sort_key());

    let req = if pos > 0 {
        match include(&mut pending[pos - 1], req, max_aggregation) {
            None => {
                let mut size = pending[pos - 1].reqnb() as i64;
                if pos < pending.len() {
                    let predecessor = pending.remove(pos - 1);
                    let successor = pending.remove(pos - 1);
                    let (joined, leftover) = join(predecessor, successor, max_aggregation);
                    size = joined.reqnb() as i64;
                    insert_sorted(pending, joined);
                    if let Some(leftover) = leftover {
                        insert_sorted(pending, leftover);
                    }
                }
                return size;
            }
            Some(req) => req,
        }
    } else {
        req
    };

    let mut req = req;
    if pos < pending.len() {
        let successor = pending.remove(pos);
        if let Some(successor) = include(&mut req, successor, max_aggregation) {
            pending.insert(pos, successor);
        }
    }
    let size = req.reqnb() as i64;
    insert_sorted(pending, req);
    size
}

fn insert_sorted(pending: &mut Vec<Request>, req: Request) {
    let pos = pending.partition_point(|existing| existing.sort_key() <= req.sort_key());
    pending.insert(pos, req);
}

/// Finds a simple request, possibly nested inside a virtual's children,
/// whose bounding box contains `(offset, length)`. Ported from the
/// containment test in `agios_cancel_request.c`.
pub fn contains(req: &Request, offset: u64, length: u64) -> bool {
    req.offset() <= offset && req.end_offset() >= offset + length
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestType;

    fn simple(offset: u64, length: u64) -> SimpleRequest {
        SimpleRequest {
            file_id: "f".into(),
            req_type: RequestType::Read,
            offset,
            length,
            user_id: 0,
            queue_id: 0,
            arrival_time: offset as i64,
            dispatch_time: None,
            timestamp: offset,
            sched_factor: 0,
            sw_priority: 0,
            callback: None,
        }
    }

    #[test]
    fn include_merges_contiguous_requests_into_virtual() {
        let mut existing = Request::Simple(simple(0, 100));
        let merged = include(&mut existing, Request::Simple(simple(100, 50)), 16);
        assert!(merged.is_none());
        assert_eq!(existing.reqnb(), 2);
        assert_eq!(existing.offset(), 0);
        assert_eq!(existing.end_offset(), 150);
    }

    #[test]
    fn include_rejects_non_contiguous_requests() {
        let mut existing = Request::Simple(simple(0, 100));
        let rejected = include(&mut existing, Request::Simple(simple(200, 50)), 16);
        assert!(rejected.is_some());
        assert_eq!(existing.reqnb(), 1);
    }

    #[test]
    fn include_respects_max_aggregation_cap() {
        let mut existing = Request::Simple(simple(0, 100));
        let rejected = include(&mut existing, Request::Simple(simple(100, 50)), 1);
        assert!(rejected.is_some());
    }

    #[test]
    fn remove_child_dissolves_virtual_with_one_remaining_child() {
        let v = VirtualRequest {
            file_id: "f".into(),
            req_type: RequestType::Read,
            offset: 0,
            length: 150,
            queue_id: 0,
            arrival_time: 0,
            dispatch_time: None,
            timestamp: 0,
            sched_factor: 0,
            children: vec![simple(0, 100), simple(100, 50)],
        };
        match remove_child(v, 0, 100).unwrap() {
            AfterRemoval::Dissolved(s) => {
                assert_eq!(s.offset, 100);
                assert_eq!(s.length, 50);
            }
            _ => panic!("expected dissolution"),
        }
    }

    #[test]
    fn remove_child_recomputes_bounds_from_scratch() {
        let v = VirtualRequest {
            file_id: "f".into(),
            req_type: RequestType::Read,
            offset: 0,
            length: 300,
            queue_id: 0,
            arrival_time: 0,
            dispatch_time: None,
            timestamp: 0,
            sched_factor: 0,
            children: vec![simple(0, 100), simple(100, 100), simple(200, 100)],
        };
        match remove_child(v, 0, 100).unwrap() {
            AfterRemoval::StillVirtual(v) => {
                assert_eq!(v.offset, 100);
                assert_eq!(v.length, 200);
                assert_eq!(v.children.len(), 2);
            }
            _ => panic!("expected still-virtual"),
        }
    }

    #[test]
    fn insert_with_aggregation_bridges_a_gap_between_two_existing_entries() {
        let mut pending = vec![Request::Simple(simple(0, 100)), Request::Simple(simple(200, 100))];
        insert_with_aggregation(&mut pending, Request::Simple(simple(100, 100)), 16);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].offset(), 0);
        assert_eq!(pending[0].end_offset(), 300);
        assert_eq!(pending[0].reqnb(), 3);
    }

    #[test]
    fn insert_with_aggregation_merges_into_successor_when_no_predecessor() {
        let mut pending = vec![Request::Simple(simple(100, 100))];
        insert_with_aggregation(&mut pending, Request::Simple(simple(0, 100)), 16);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].offset(), 0);
        assert_eq!(pending[0].end_offset(), 200);
    }

    #[test]
    fn insert_with_aggregation_respects_max_aggregation_when_bridging() {
        let mut pending = vec![Request::Simple(simple(0, 100)), Request::Simple(simple(200, 100))];
        insert_with_aggregation(&mut pending, Request::Simple(simple(100, 100)), 2);
        // Bridging all three would exceed the cap, so the gap-filler stays
        // folded into the predecessor only; the successor stays separate.
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].reqnb(), 2);
        assert_eq!(pending[1].reqnb(), 1);
    }
}
