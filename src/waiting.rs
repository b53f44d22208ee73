//! Shift-phenomenon and better-aggregation detection used by aIOLi/MLF to
//! impose a short artificial wait on a file, giving nearby requests a
//! chance to arrive and aggregate. Ported from
//! `original_source/src/waiting_common.c`.

use crate::file::File;
use crate::queue::Queue;
use crate::request::RequestType;

/// Default artificial wait imposed once a shift or missed-aggregation is
/// detected, matching the source's fixed `config_waiting_time` usage when
/// no override is configured.
pub const DEFAULT_WAITING_TIME_NS: i64 = 500_000;

/// Updates shift-detection and best-known-aggregation state for `queue`
/// after a new request at `[offset, offset+length)` arrived. Ported from
/// `waiting_common.c::update_waiting_time_counters`.
pub fn update_waiting_time_counters(queue: &mut Queue, offset: u64, length: u64, aggregation_size: i64) {
    queue.last_start_off = Some(offset);
    queue.last_final_off = Some(offset + length);
    queue.predicted_off = Some(offset + length);
    if aggregation_size > queue.last_aggregation {
        queue.last_aggregation = aggregation_size;
    }
    if aggregation_size > queue.best_agg {
        queue.best_agg = aggregation_size;
        // A better aggregation than ever seen before doubles the quantum,
        // letting more requests batch up next round.
        queue.next_quantum = queue.next_quantum.saturating_mul(2);
    }
}

/// True when a request at `offset` breaks the access pattern `queue` was
/// predicting (i.e. it does not continue where the last one left off),
/// ported from the shift check in `waiting_common.c::check_selection`.
pub fn detects_shift(queue: &Queue, offset: u64) -> bool {
    match queue.predicted_off {
        Some(predicted) => predicted != offset,
        None => false,
    }
}

/// Called after dispatching from `file`'s queue for `req_type`: if a shift
/// was just detected, arms a short wait on the file so the next batch of
/// nearby requests has a chance to arrive before the scheduler visits it
/// again. Also rolls `last_start_off`/`last_final_off` forward and, for a
/// request that continues backwards past where the last one started,
/// re-predicts `predicted_off` at the new (lower) start instead of leaving
/// it pointed at the old forward prediction. Ported from
/// `waiting_algorithms_postprocess`/shared with its arrival-time sibling
/// `update_waiting_time_counters`.
pub fn waiting_algorithms_postprocess(
    file: &mut File,
    req_type: RequestType,
    offset: u64,
    length: u64,
    now_ns: i64,
    waiting_time_ns: i64,
) {
    let shifted = detects_shift(file.queue(req_type), offset);
    {
        let queue = file.queue_mut(req_type);
        if matches!(queue.last_start_off, Some(last_start) if offset < last_start) {
            queue.predicted_off = Some(offset);
        }
        queue.last_start_off = Some(offset);
        queue.last_final_off = Some(offset + length);
    }
    if shifted {
        file.waiting_until_ns = Some(now_ns + waiting_time_ns);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_shift_on_first_request() {
        let q = Queue::new(8192);
        assert!(!detects_shift(&q, 0));
    }

    #[test]
    fn shift_detected_when_offset_breaks_prediction() {
        let mut q = Queue::new(8192);
        update_waiting_time_counters(&mut q, 0, 100, 1);
        assert!(!detects_shift(&q, 100));
        assert!(detects_shift(&q, 500));
    }

    #[test]
    fn better_aggregation_doubles_quantum() {
        let mut q = Queue::new(8192);
        update_waiting_time_counters(&mut q, 0, 100, 4);
        assert_eq!(q.next_quantum, 16384);
        update_waiting_time_counters(&mut q, 100, 100, 2);
        assert_eq!(q.next_quantum, 16384);
    }

    #[test]
    fn postprocess_arms_wait_on_shift() {
        let mut file = File::new("f".into(), 8192);
        update_waiting_time_counters(&mut file.read_queue, 0, 100, 1);
        waiting_algorithms_postprocess(&mut file, RequestType::Read, 9999, 50, 1000, DEFAULT_WAITING_TIME_NS);
        assert!(file.is_waiting(1000));
    }

    #[test]
    fn postprocess_tracks_backward_continuation() {
        let mut file = File::new("f".into(), 8192);
        update_waiting_time_counters(&mut file.read_queue, 500, 100, 1);
        // Next request starts below where the last one started: the access
        // pattern is going backwards, so the prediction follows it down
        // instead of staying pinned at the old forward endpoint.
        waiting_algorithms_postprocess(&mut file, RequestType::Read, 200, 100, 1000, DEFAULT_WAITING_TIME_NS);
        assert_eq!(file.read_queue.predicted_off, Some(200));
        assert_eq!(file.read_queue.last_start_off, Some(200));
        assert_eq!(file.read_queue.last_final_off, Some(300));
    }
}
