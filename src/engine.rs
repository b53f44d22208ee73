//! The public entry point: `Engine::init` spawns the scheduling thread and
//! returns a handle through which callers submit, release and cancel
//! requests. Ported from `original_source/src/agios.c`,
//! `agios_add_request.c`, `agios_release_request.c`,
//! `agios_cancel_request.c` and `agios_counters.c`.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex, RwLock};

use crate::aggregation::{contains, include, remove_child, AfterRemoval};
use crate::config::Config;
use crate::dispatch::RequestCallbacks;
use crate::error::{AgiosError, Result};
use crate::hashtable::Hashtable;
use crate::migration::insertion_order_for;
use crate::performance::PerformanceRing;
use crate::policy::aioli::Aioli;
use crate::policy::mlf::Mlf;
use crate::policy::noop::Noop;
use crate::policy::sjf::Sjf;
use crate::policy::to::TimeOrder;
use crate::policy::twins::Twins;
use crate::policy::wfq::Wfq;
use crate::policy::{PolicyId, SchedulingPolicy};
use crate::request::{Request, RequestType, SimpleRequest};
use crate::scheduler_thread::run_scheduler_thread;
use crate::stats::{GlobalStatistics, Metrics};
use crate::time::Clock;
use crate::trace::Trace;

/// Builds a fresh policy instance for the scheduler thread's dynamic
/// re-selection, reusing the same construction rules `Engine::init` uses.
pub(crate) fn build_policy_for_migration(id: PolicyId, shared: &Shared) -> Arc<dyn SchedulingPolicy> {
    build_policy(id, shared.max_queue_id, &shared.config)
}

fn build_policy(id: PolicyId, max_queue_id: u32, config: &Config) -> Arc<dyn SchedulingPolicy> {
    match id {
        PolicyId::Noop => Arc::new(Noop),
        PolicyId::To => Arc::new(TimeOrder::to()),
        PolicyId::ToAgg => Arc::new(TimeOrder::to_agg()),
        PolicyId::Sw => Arc::new(TimeOrder::sw()),
        PolicyId::Sjf => Arc::new(Sjf),
        PolicyId::Mlf => Arc::new(Mlf),
        PolicyId::Aioli => Arc::new(Aioli),
        PolicyId::Twins => Arc::new(Twins::new(max_queue_id, config.twins_window_ns)),
        PolicyId::Wfq => {
            let mut weights = config.wfq_weights.clone();
            weights.resize(max_queue_id as usize + 1, 1);
            Arc::new(Wfq::new(weights))
        }
    }
}

/// Shared state reachable from both `Engine`'s public methods and the
/// background scheduler thread.
pub(crate) struct Shared {
    pub(crate) hashtable: Hashtable,
    pub(crate) timeline: crate::timeline::Timeline,
    pub(crate) clock: Clock,
    pub(crate) current_policy: RwLock<Arc<dyn SchedulingPolicy>>,
    pub(crate) config: Config,
    pub(crate) callbacks: Arc<dyn RequestCallbacks>,
    pub(crate) performance: PerformanceRing,
    pub(crate) global_stats: Mutex<GlobalStatistics>,
    pub(crate) current_reqnb: AtomicI64,
    pub(crate) current_filenb: AtomicI64,
    pub(crate) processed_reqnb: AtomicI64,
    pub(crate) trace: Option<Trace>,
    pub(crate) max_queue_id: u32,
    pub(crate) signal: Condvar,
    pub(crate) signal_mutex: Mutex<()>,
    pub(crate) stop: AtomicBool,
}

/// Handle returned by `Engine::init`. Dropping it does not stop the
/// scheduler thread; call `shutdown` explicitly, matching the source's
/// explicit `agios_exit()` entry point.
pub struct Engine {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl Engine {
    /// Ported from `agios.c::agios_init`.
    pub fn init(
        callbacks: Arc<dyn RequestCallbacks>,
        config_path: Option<&Path>,
        max_queue_id: u32,
    ) -> Result<Engine> {
        let config = Config::load(config_path)?;

        let trace = if config.trace_enabled {
            Some(Trace::init(
                Path::new("."),
                &config.trace_file_prefix,
                &config.trace_file_suffix,
                config.max_trace_buffer_size,
            )?)
        } else {
            None
        };

        let initial_policy = build_policy(config.default_policy, max_queue_id, &config);

        let shared = Arc::new(Shared {
            hashtable: Hashtable::new(),
            timeline: crate::timeline::Timeline::new(max_queue_id),
            clock: Clock::start(),
            current_policy: RwLock::new(initial_policy),
            config,
            callbacks,
            performance: PerformanceRing::new(5),
            global_stats: Mutex::new(GlobalStatistics::default()),
            current_reqnb: AtomicI64::new(0),
            current_filenb: AtomicI64::new(0),
            processed_reqnb: AtomicI64::new(0),
            trace,
            max_queue_id,
            signal: Condvar::new(),
            signal_mutex: Mutex::new(()),
            stop: AtomicBool::new(false),
        });

        {
            let policy = shared.current_policy.read();
            shared.performance.start_epoch(policy.id().name(), shared.clock.now_ns());
        }

        let thread_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("agios-scheduler".to_string())
            .spawn(move || run_scheduler_thread(thread_shared))
            .map_err(|e| AgiosError::AllocFailure(format!("could not spawn scheduler thread: {e}")))?;

        tracing::info!(policy = shared.current_policy.read().id().name(), "agios engine started");

        Ok(Engine { shared, thread: Some(thread) })
    }

    /// Ported from `agios_add_request.c::agios_add_request`.
    pub fn add_request(
        &self,
        file_id: &str,
        req_type: RequestType,
        offset: u64,
        length: u64,
        user_id: u64,
    ) -> Result<()> {
        if length == 0 {
            return Err(AgiosError::InvalidArgument("request length must be nonzero".to_string()));
        }
        let queue_id = (user_id % (self.shared.max_queue_id as u64 + 1)) as u32;
        let now = self.shared.clock.now_ns();

        {
            let mut stats = self.shared.global_stats.lock();
            stats.on_arrival(now, length, matches!(req_type, RequestType::Read));
        }

        if let Some(trace) = &self.shared.trace {
            trace.add_request(now, file_id, req_type, offset, length);
        }

        let policy = Arc::clone(&*self.shared.current_policy.read());
        let max_aggregation = policy.max_aggregation();

        let req = Request::Simple(SimpleRequest {
            file_id: file_id.to_string(),
            req_type,
            offset,
            length,
            user_id,
            queue_id,
            arrival_time: now,
            dispatch_time: None,
            timestamp: now as u64,
            sched_factor: 0,
            sw_priority: now,
            callback: None,
        });

        let mut became_active = false;
        self.shared.hashtable.with_file_or_insert(file_id, policy_quantum(), |file| {
            file.queue_mut(req_type).note_arrival(now, length, offset);
            if file.pending_reqnb == 0 {
                became_active = true;
            }
            file.pending_reqnb += 1;
        });
        if became_active {
            self.shared.current_filenb.fetch_add(1, Ordering::SeqCst);
        }
        self.shared.current_reqnb.fetch_add(1, Ordering::SeqCst);

        if policy.uses_hashtable() {
            self.shared.hashtable.with_existing_file(file_id, |file| {
                let queue = file.queue_mut(req_type);
                let aggregation_size = if max_aggregation > 1 {
                    crate::aggregation::insert_with_aggregation(&mut queue.pending, req, max_aggregation)
                } else {
                    queue.insert_sorted(req);
                    1
                };
                // Primes aIOLi/MLF's shift-detection state on every
                // arrival, not just inside their own unit tests, so
                // `detects_shift`/`is_waiting` have real data to work with.
                crate::waiting::update_waiting_time_counters(queue, offset, length, aggregation_size);
            });
        } else {
            let order = insertion_order_for(policy.id());
            if max_aggregation > 1 {
                if let Some(leftover) = self.shared.timeline.try_aggregate_tail(req, max_aggregation, |existing, incoming| {
                    include(existing, incoming, max_aggregation)
                }) {
                    self.shared.timeline.insert(leftover, order);
                }
            } else {
                self.shared.timeline.insert(req, order);
            }
        }

        self.signal_new_request();
        Ok(())
    }

    /// Ported from `agios_release_request.c::agios_release_request`.
    pub fn release_request(&self, file_id: &str, req_type: RequestType, offset: u64, length: u64) -> Result<()> {
        let now = self.shared.clock.now_ns();
        let released = self.shared.hashtable.with_existing_file(file_id, |file| {
            file.queue_mut(req_type).take_from_dispatch(offset, length)
        });
        let Some(Some(req)) = released else {
            return Err(AgiosError::NotFound { file_id: file_id.to_string(), offset, length });
        };

        let elapsed = now - req.dispatch_time().unwrap_or(req.arrival_time());
        let bandwidth = if elapsed > 0 { (length as i64 * 1_000_000_000) / elapsed } else { 0 };

        self.shared.hashtable.with_existing_file(file_id, |file| {
            let queue = file.queue_mut(req_type);
            queue.stats.released_reqnb += 1;
            queue.stats.processed_req_size += length as i64;
            queue.stats.processed_bandwidth =
                crate::time::update_iterative_average(queue.stats.processed_bandwidth, bandwidth, queue.stats.released_reqnb);
        });

        let dispatch_ts = req.dispatch_time().unwrap_or(req.arrival_time());
        let is_current = self.shared.performance.is_current_epoch(dispatch_ts);
        self.shared.performance.record_release(dispatch_ts, length as i64, bandwidth);
        if is_current {
            self.shared.processed_reqnb.fetch_add(1, Ordering::SeqCst);
        }

        Ok(())
    }

    /// Ported from `agios_cancel_request.c::agios_cancel_request`.
    pub fn cancel_request(&self, file_id: &str, req_type: RequestType, offset: u64, length: u64) -> Result<()> {
        let policy = Arc::clone(&*self.shared.current_policy.read());
        let removed = if policy.uses_hashtable() {
            self.shared.hashtable.with_existing_file(file_id, |file| {
                cancel_from_pending(file.queue_mut(req_type), offset, length)
            }).flatten()
        } else {
            let order = insertion_order_for(policy.id());
            cancel_from_timeline(&self.shared.timeline, file_id, req_type, offset, length, order)
        };

        match removed {
            Some(()) => {
                let became_idle = self
                    .shared
                    .hashtable
                    .with_existing_file(file_id, |file| file.release_pending(1))
                    .unwrap_or(false);
                if became_idle {
                    self.shared.current_filenb.fetch_sub(1, Ordering::SeqCst);
                }
                self.shared.current_reqnb.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(AgiosError::NotFound { file_id: file_id.to_string(), offset, length }),
        }
    }

    /// Ported from spec §6's metrics snapshot; resets global counters the
    /// same way `reset_global_stats` does after a read.
    pub fn metrics_snapshot_and_reset(&self) -> Metrics {
        let mut stats = self.shared.global_stats.lock();
        let snapshot = Metrics {
            total: stats.total_reqnb,
            reads: stats.reads,
            writes: stats.writes,
            avg_inter_arrival_ns: stats.avg_time_between_requests,
            avg_size: stats.avg_request_size,
            max_size: 0,
            file_count: self.shared.current_filenb.load(Ordering::SeqCst),
            avg_offset_distance: 0,
            served_bytes: 0,
        };
        stats.reset();
        snapshot
    }

    /// Ported from `agios.c::agios_exit`.
    pub fn shutdown(mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.shared.signal.notify_all();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        tracing::info!("agios engine stopped");
    }

    fn signal_new_request(&self) {
        let _guard = self.shared.signal_mutex.lock();
        self.shared.signal.notify_one();
    }
}

fn policy_quantum() -> u64 {
    crate::policy::mlf::MLF_QUANTUM
}

/// Removes a request matching `(offset, length)` from `queue`'s pending
/// list, splitting a virtual that only partially matches via
/// `aggregation::remove_child`, per `agios_cancel_request.c`.
fn cancel_from_pending(queue: &mut crate::queue::Queue, offset: u64, length: u64) -> Option<()> {
    let idx = queue.pending.iter().position(|r| match r {
        Request::Simple(s) => s.offset == offset && s.length == length,
        Request::Virtual(_) => contains(r, offset, length),
    })?;

    match queue.pending.remove(idx) {
        Request::Simple(s) if s.offset == offset && s.length == length => Some(()),
        Request::Simple(s) => {
            queue.pending.insert(idx, Request::Simple(s));
            None
        }
        Request::Virtual(v) => {
            match remove_child(v, offset, length) {
                Some(AfterRemoval::StillVirtual(v)) => {
                    queue.pending.insert(idx, Request::Virtual(v));
                    Some(())
                }
                Some(AfterRemoval::Dissolved(s)) => {
                    queue.pending.insert(idx, Request::Simple(s));
                    Some(())
                }
                None => None,
            }
        }
    }
}

/// Same logic as `cancel_from_pending`, for a request living in the
/// shared timeline instead of a file's pending list.
fn cancel_from_timeline(
    timeline: &crate::timeline::Timeline,
    file_id: &str,
    req_type: RequestType,
    offset: u64,
    length: u64,
    order: crate::timeline::InsertionOrder,
) -> Option<()> {
    let matched = timeline.take_matching(|r| {
        r.file_id() == file_id
            && r.req_type() == req_type
            && match r {
                Request::Simple(s) => s.offset == offset && s.length == length,
                Request::Virtual(_) => contains(r, offset, length),
            }
    })?;

    match matched {
        Request::Simple(s) if s.offset == offset && s.length == length => Some(()),
        Request::Simple(s) => {
            timeline.put_back(Request::Simple(s), order);
            None
        }
        Request::Virtual(v) => match remove_child(v, offset, length) {
            Some(AfterRemoval::StillVirtual(v)) => {
                timeline.put_back(Request::Virtual(v), order);
                Some(())
            }
            Some(AfterRemoval::Dissolved(s)) => {
                timeline.put_back(Request::Simple(s), order);
                Some(())
            }
            None => None,
        },
    }
}
