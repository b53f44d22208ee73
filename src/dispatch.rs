//! Two-phase dispatch: `phase1` moves requests out of the active index
//! under lock and builds a `Batch`; `phase2` invokes the user's callbacks
//! with no locks held. Ported from
//! `original_source/src/process_request.c`.

use crate::request::Request;

/// User-supplied callbacks invoked when the scheduler dispatches a
/// request (or a batch of aggregated requests). Ported from
/// `struct agios_client { process_request_cb, process_requests_cb }`.
pub trait RequestCallbacks: Send + Sync {
    /// Invoked once per user-visible request id in a dispatched batch.
    fn process_one(&self, user_id: u64);

    /// Invoked once for a whole batch when more than one user id is being
    /// dispatched together, if the consumer wants batch-level handling.
    /// Defaults to calling `process_one` for each id in order, matching
    /// the source's fallback when no `process_requests_cb` was supplied.
    fn process_many(&self, user_ids: &[u64]) {
        for id in user_ids {
            self.process_one(*id);
        }
    }
}

/// One dispatched unit: the (possibly aggregated) `Request` plus the flat
/// list of user-visible ids it represents. Ported from
/// `struct processing_info_t { reqs, reqnb, list }`.
pub struct Batch {
    pub request: Request,
    pub user_ids: Vec<u64>,
}

impl Batch {
    /// Builds a batch from a dispatched request, flattening a `Virtual`
    /// into its children's ids. Ported from `process_requests_step1`.
    pub fn from_request(request: Request) -> Self {
        let user_ids = match &request {
            Request::Simple(r) => vec![r.user_id],
            Request::Virtual(v) => v.children.iter().map(|c| c.user_id).collect(),
        };
        Batch { request, user_ids }
    }

    /// Builds a batch out of several requests dispatched together in one
    /// scheduling visit (aIOLi's quantum-ladder multi-dispatch), flattening
    /// every one's ids into a single list in dispatch order. `request`
    /// holds the first of the group; phase2 only looks at `user_ids`.
    pub fn from_requests(mut requests: Vec<Request>) -> Self {
        let user_ids = requests
            .iter()
            .flat_map(|r| match r {
                Request::Simple(s) => vec![s.user_id],
                Request::Virtual(v) => v.children.iter().map(|c| c.user_id).collect(),
            })
            .collect();
        let request = requests.remove(0);
        Batch { request, user_ids }
    }
}

/// Invokes the user's callbacks for `batch` with no scheduler locks held.
/// Ported from `process_requests_step2`.
pub fn phase2(callbacks: &dyn RequestCallbacks, batch: &Batch) {
    if batch.user_ids.len() == 1 {
        callbacks.process_one(batch.user_ids[0]);
    } else {
        callbacks.process_many(&batch.user_ids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{RequestType, SimpleRequest, VirtualRequest};
    use std::sync::Mutex as StdMutex;

    struct RecordingCallbacks {
        seen: StdMutex<Vec<u64>>,
    }

    impl RequestCallbacks for RecordingCallbacks {
        fn process_one(&self, user_id: u64) {
            self.seen.lock().unwrap().push(user_id);
        }
    }

    fn simple(user_id: u64) -> SimpleRequest {
        SimpleRequest {
            file_id: "f".into(),
            req_type: RequestType::Read,
            offset: 0,
            length: 10,
            user_id,
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
    fn simple_request_dispatches_one_id() {
        let batch = Batch::from_request(Request::Simple(simple(7)));
        assert_eq!(batch.user_ids, vec![7]);
        let cb = RecordingCallbacks { seen: StdMutex::new(Vec::new()) };
        phase2(&cb, &batch);
        assert_eq!(*cb.seen.lock().unwrap(), vec![7]);
    }

    #[test]
    fn virtual_request_flattens_children_and_uses_batch_path() {
        let v = VirtualRequest {
            file_id: "f".into(),
            req_type: RequestType::Read,
            offset: 0,
            length: 20,
            queue_id: 0,
            arrival_time: 0,
            dispatch_time: None,
            timestamp: 0,
            sched_factor: 0,
            children: vec![simple(1), simple(2)],
        };
        let batch = Batch::from_request(Request::Virtual(v));
        assert_eq!(batch.user_ids, vec![1, 2]);
        let cb = RecordingCallbacks { seen: StdMutex::new(Vec::new()) };
        phase2(&cb, &batch);
        assert_eq!(*cb.seen.lock().unwrap(), vec![1, 2]);
    }
}
