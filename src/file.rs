//! A file known to the scheduler: one read `Queue`, one write `Queue`, and
//! the waiting-time state imposed on it by aIOLi/MLF. Ported from
//! `original_source/src/agios_add_request.c` (`file_constructor`,
//! `find_req_file`).

use crate::queue::Queue;
use crate::request::RequestType;

pub struct File {
    pub file_id: String,
    pub read_queue: Queue,
    pub write_queue: Queue,

    /// Count of requests belonging to this file not yet dispatched, summed
    /// across both queues and (under timeline policies) the global
    /// timeline. Ported from `req_file_t::timeline_reqnb`; when this drops
    /// to zero the engine decrements its global `current_filenb`.
    pub pending_reqnb: u64,

    /// Artificial per-file delay imposed by the waiting-times module
    /// (`waiting.rs`) after detecting a shift or a missed aggregation
    /// opportunity. `None` when no wait is currently being enforced.
    pub waiting_until_ns: Option<i64>,
}

impl File {
    pub fn new(file_id: String, initial_quantum: u64) -> Self {
        File {
            file_id,
            read_queue: Queue::new(initial_quantum),
            write_queue: Queue::new(initial_quantum),
            pending_reqnb: 0,
            waiting_until_ns: None,
        }
    }

    pub fn queue(&self, req_type: RequestType) -> &Queue {
        match req_type {
            RequestType::Read => &self.read_queue,
            RequestType::Write => &self.write_queue,
        }
    }

    pub fn queue_mut(&mut self, req_type: RequestType) -> &mut Queue {
        match req_type {
            RequestType::Read => &mut self.read_queue,
            RequestType::Write => &mut self.write_queue,
        }
    }

    /// True once neither queue holds a pending or dispatched request and
    /// the file has nothing outstanding in the global timeline either.
    pub fn is_idle(&self) -> bool {
        self.pending_reqnb == 0
            && self.read_queue.dispatch.is_empty()
            && self.write_queue.dispatch.is_empty()
    }

    pub fn is_waiting(&self, now_ns: i64) -> bool {
        matches!(self.waiting_until_ns, Some(until) if now_ns < until)
    }

    /// Subtracts `count` from `pending_reqnb`, returning `true` exactly
    /// when this call is the one that crosses from nonzero to zero --
    /// the caller's cue to decrement the engine's global `current_filenb`.
    pub fn release_pending(&mut self, count: u64) -> bool {
        let was_nonzero = self.pending_reqnb > 0;
        self.pending_reqnb = self.pending_reqnb.saturating_sub(count);
        was_nonzero && self.pending_reqnb == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_selection_matches_direction() {
        let f = File::new("f".into(), 8192);
        assert_eq!(f.queue(RequestType::Read) as *const Queue, &f.read_queue as *const Queue);
        assert_eq!(f.queue(RequestType::Write) as *const Queue, &f.write_queue as *const Queue);
    }

    #[test]
    fn fresh_file_is_idle() {
        let f = File::new("f".into(), 8192);
        assert!(f.is_idle());
    }

    #[test]
    fn waiting_window_expires() {
        let mut f = File::new("f".into(), 8192);
        f.waiting_until_ns = Some(100);
        assert!(f.is_waiting(50));
        assert!(!f.is_waiting(150));
    }
}
