//! Moves every pending request between the hashtable and timeline indexes
//! when the active policy changes. Ported from spec's migration rules and
//! the struct layouts in `original_source/src/data_structures.h`.

use crate::hashtable::Hashtable;
use crate::policy::{PolicyId, SchedulingPolicy};
use crate::request::{Request, RequestType};
use crate::timeline::{InsertionOrder, Timeline};

/// Which ordering a policy wants requests inserted under.
pub fn insertion_order_for(id: PolicyId) -> InsertionOrder {
    match id {
        PolicyId::Sw => InsertionOrder::SwPriority,
        PolicyId::Twins | PolicyId::Wfq => InsertionOrder::PerQueue,
        _ => InsertionOrder::Fifo,
    }
}

/// Moves every request out of whichever index `prev` used and into
/// whichever index `next` uses. A request that was aggregated into a
/// `Virtual` under a cap-16 policy is split back into its simple children
/// before being re-inserted into a cap-1 policy's index, per spec §4.K.
pub fn migrate(
    hashtable: &Hashtable,
    timeline: &Timeline,
    prev: &dyn SchedulingPolicy,
    next: &dyn SchedulingPolicy,
) {
    let order = insertion_order_for(next.id());
    let splitting = prev.max_aggregation() > 1 && next.max_aggregation() == 1;

    let drained: Vec<Request> = if prev.uses_hashtable() {
        drain_hashtable(hashtable)
    } else {
        drain_timeline(timeline)
    };

    for req in drained {
        let pieces: Vec<Request> = if splitting {
            split_virtual(req)
        } else {
            vec![req]
        };

        for piece in pieces {
            if next.uses_hashtable() {
                let file_id = piece.file_id().to_string();
                hashtable.with_file_or_insert(&file_id, 8192, move |file| {
                    file.queue_mut(piece.req_type()).insert_sorted(piece);
                });
            } else {
                timeline.insert(piece, order);
            }
        }
    }
}

fn drain_hashtable(hashtable: &Hashtable) -> Vec<Request> {
    let mut out = Vec::new();
    hashtable.for_each_file(|file| {
        for req_type in [RequestType::Read, RequestType::Write] {
            out.append(&mut file.queue_mut(req_type).pending);
        }
        None::<()>
    });
    out
}

fn drain_timeline(timeline: &Timeline) -> Vec<Request> {
    timeline.drain_all()
}

/// Splits a `Virtual` back into its simple children, ported from the
/// recompute-by-children logic already shared with cancel-on-virtual
/// (`aggregation.rs::remove_child`); here the whole virtual dissolves at
/// once rather than one child at a time.
fn split_virtual(req: Request) -> Vec<Request> {
    match req {
        Request::Simple(s) => vec![Request::Simple(s)],
        Request::Virtual(v) => v.children.into_iter().map(Request::Simple).collect(),
    }
}
