//! Synthetic load generator and test driver, unifying the two historical
//! C test drivers (`agios_test.c`'s `test_process`/`test_thr` harness and
//! its CSV-capable `executed` list) behind one `clap` CLI.

use std::collections::HashMap;
use std::fs::File as StdFile;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::{Duration, Instant};

use agios::{Engine, RequestCallbacks, RequestType};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "agios-harness", about = "Synthetic I/O request load generator")]
struct Args {
    /// Number of concurrent request-generating threads.
    #[arg(long, default_value_t = 4)]
    threads: u32,

    /// Number of distinct files requests are spread across.
    #[arg(long, default_value_t = 8)]
    files: u32,

    /// Requests generated per thread.
    #[arg(long = "requests-per-thread", default_value_t = 200)]
    requests_per_thread: u32,

    /// Number of distinct queue ids (used by TWINS/WFQ) requests round-robin over.
    #[arg(long = "queue-ids", default_value_t = 4)]
    queue_ids: u32,

    /// Percentage (0-100) chance a request continues sequentially from the
    /// previous one on the same file rather than picking a random offset.
    #[arg(long = "sequential-pct", default_value_t = 70)]
    sequential_pct: u32,

    /// Request size in bytes.
    #[arg(long = "request-size", default_value_t = 4096)]
    request_size: u64,

    /// Simulated inter-arrival time between a thread's requests, in nanoseconds.
    #[arg(long = "inter-arrival-ns", default_value_t = 100_000)]
    inter_arrival_ns: u64,

    /// Simulated time the backing store takes to service a request, in nanoseconds.
    #[arg(long = "process-ns", default_value_t = 50_000)]
    process_ns: u64,

    /// Optional RNG seed, for reproducible runs.
    #[arg(long)]
    seed: Option<u64>,

    /// Optional path to write a per-request CSV (file_id,offset,length,start_ns,end_ns).
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Optional AGIOS config file (key=value), falls back to defaults if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Highest queue id the engine should be prepared for (must be >= queue-ids - 1).
    #[arg(long = "max-queue-id")]
    max_queue_id: Option<u32>,
}

/// Minimal xorshift64* generator, standing in for the source's seeded
/// `rand_r` calls with no external dependency.
struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Rng(seed.max(1))
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn next_u32_below(&mut self, bound: u32) -> u32 {
        (self.next_u64() % bound as u64) as u32
    }
}

struct ExecutedEntry {
    file_id: String,
    offset: u64,
    length: u64,
    start_ns: u64,
    end_ns: u64,
}

struct PendingRequest {
    file_id: String,
    req_type: RequestType,
    offset: u64,
    length: u64,
    start_ns: u64,
}

struct HarnessCallbacks {
    engine_start: Instant,
    engine: OnceLock<Weak<Engine>>,
    pending: Mutex<HashMap<u64, PendingRequest>>,
    executed: Mutex<Vec<ExecutedEntry>>,
    process_ns: u64,
    completed: AtomicU64,
}

impl HarnessCallbacks {
    fn note_submission(&self, user_id: u64, file_id: String, req_type: RequestType, offset: u64, length: u64) {
        let start_ns = self.engine_start.elapsed().as_nanos() as u64;
        self.pending.lock().unwrap().insert(
            user_id,
            PendingRequest { file_id, req_type, offset, length, start_ns },
        );
    }
}

impl RequestCallbacks for HarnessCallbacks {
    fn process_one(&self, user_id: u64) {
        std::thread::sleep(Duration::from_nanos(self.process_ns));
        let end_ns = self.engine_start.elapsed().as_nanos() as u64;

        let pending = self.pending.lock().unwrap().remove(&user_id);
        if let Some(req) = pending {
            if let Some(engine) = self.engine.get().and_then(Weak::upgrade) {
                if let Err(e) = engine.release_request(&req.file_id, req.req_type, req.offset, req.length) {
                    tracing::warn!(error = %e, "release_request failed");
                }
            }
            self.executed.lock().unwrap().push(ExecutedEntry {
                file_id: req.file_id,
                offset: req.offset,
                length: req.length,
                start_ns: req.start_ns,
                end_ns,
            });
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let max_queue_id = args.max_queue_id.unwrap_or(args.queue_ids.saturating_sub(1));

    let callbacks = Arc::new(HarnessCallbacks {
        engine_start: Instant::now(),
        engine: OnceLock::new(),
        pending: Mutex::new(HashMap::new()),
        executed: Mutex::new(Vec::new()),
        process_ns: args.process_ns,
        completed: AtomicU64::new(0),
    });

    let engine = Engine::init(callbacks.clone(), args.config.as_deref(), max_queue_id)
        .expect("failed to start agios engine");
    let engine = Arc::new(engine);
    let _ = callbacks.engine.set(Arc::downgrade(&engine));

    // `queue_ids` only matters insofar as it divides the `user_id` space:
    // the engine derives each request's queue id as `user_id % (max_queue_id + 1)`.
    let _ = args.queue_ids;

    let total_requests = args.threads as u64 * args.requests_per_thread as u64;
    let mut handles = Vec::new();

    for thread_idx in 0..args.threads {
        let engine = Arc::clone(&engine);
        let callbacks = Arc::clone(&callbacks);
        let args_seed = args.seed.unwrap_or(0xA61051) ^ (thread_idx as u64).wrapping_mul(0x9E3779B97F4A7C15);
        let files = args.files;
        let requests_per_thread = args.requests_per_thread;
        let sequential_pct = args.sequential_pct.min(100);
        let request_size = args.request_size;
        let inter_arrival_ns = args.inter_arrival_ns;

        handles.push(std::thread::spawn(move || {
            let mut rng = Rng::new(args_seed);
            let mut last_offset = vec![0u64; files as usize];

            for i in 0..requests_per_thread {
                std::thread::sleep(Duration::from_nanos(inter_arrival_ns));

                let file_idx = rng.next_u32_below(files.max(1));
                let file_id = format!("file-{file_idx}");
                let sequential = rng.next_u32_below(100) < sequential_pct;
                let offset = if sequential {
                    last_offset[file_idx as usize]
                } else {
                    rng.next_u64() % (1024 * 1024)
                };
                last_offset[file_idx as usize] = offset + request_size;

                let req_type = if rng.next_u32_below(2) == 0 { RequestType::Read } else { RequestType::Write };
                let user_id = (thread_idx as u64) * requests_per_thread as u64 + i as u64;

                callbacks.note_submission(user_id, file_id.clone(), req_type, offset, request_size);
                if let Err(e) = engine.add_request(&file_id, req_type, offset, request_size, user_id) {
                    tracing::warn!(error = %e, "add_request failed");
                }
            }
        }));
    }

    for handle in handles {
        handle.join().expect("generator thread panicked");
    }

    while callbacks.completed.load(Ordering::SeqCst) < total_requests {
        std::thread::sleep(Duration::from_millis(10));
    }

    if let Some(csv_path) = &args.csv {
        let mut out = StdFile::create(csv_path).expect("failed to create csv file");
        writeln!(out, "file_id,offset,length,start_ns,end_ns").unwrap();
        for entry in callbacks.executed.lock().unwrap().iter() {
            writeln!(
                out,
                "{},{},{},{},{}",
                entry.file_id, entry.offset, entry.length, entry.start_ns, entry.end_ns
            )
            .unwrap();
        }
    }

    let metrics = Arc::try_unwrap(engine)
        .map(|e| {
            let m = e.metrics_snapshot_and_reset();
            e.shutdown();
            m
        })
        .unwrap_or_else(|_| panic!("engine still has outstanding references"));

    println!(
        "processed {} requests ({} reads, {} writes)",
        metrics.total, metrics.reads, metrics.writes
    );
}
