//! Buffered append-only submission trace writer, flushed once the buffer
//! crosses `max_trace_buffer_size`. Ported from
//! `original_source/src/trace.c`.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{AgiosError, Result};
use crate::request::RequestType;

struct TraceState {
    file: File,
    buffer: String,
}

pub struct Trace {
    state: Mutex<TraceState>,
    max_buffer_size: usize,
}

impl Trace {
    /// Probes `prefix.N.sufix` for increasing `N` until an unused filename
    /// is found, then opens it for writing. Ported from
    /// `trace.c::init_trace_module`.
    pub fn init(dir: &Path, prefix: &str, suffix: &str, max_buffer_size: usize) -> Result<Trace> {
        let mut n = 0u32;
        let path: PathBuf = loop {
            let candidate = dir.join(format!("{prefix}.{n}.{suffix}"));
            if !candidate.exists() {
                break candidate;
            }
            n += 1;
        };
        let file = File::create(&path).map_err(|e| {
            AgiosError::AllocFailure(format!("could not create trace file {}: {e}", path.display()))
        })?;
        Ok(Trace {
            state: Mutex::new(TraceState { file, buffer: String::new() }),
            max_buffer_size,
        })
    }

    /// Appends one line for a just-submitted request, in
    /// `"<arrival_time>\t<file_id>\tR|W\t<offset>\t<length>\n"` format,
    /// ported from `agios_trace_print_request`/`agios_trace_add_request`.
    pub fn add_request(&self, arrival_time: i64, file_id: &str, req_type: RequestType, offset: u64, length: u64) {
        let direction = match req_type {
            RequestType::Read => 'R',
            RequestType::Write => 'W',
        };
        let mut state = self.state.lock();
        state.buffer.push_str(&format!(
            "{arrival_time}\t{file_id}\t{direction}\t{offset}\t{length}\n"
        ));
        if state.buffer.len() >= self.max_buffer_size {
            flush_locked(&mut state);
        }
    }

    pub fn flush(&self) {
        let mut state = self.state.lock();
        flush_locked(&mut state);
    }
}

fn flush_locked(state: &mut TraceState) {
    if state.buffer.is_empty() {
        return;
    }
    if let Err(e) = state.file.write_all(state.buffer.as_bytes()) {
        tracing::error!(error = %e, "failed to flush trace buffer");
    }
    state.buffer.clear();
}

impl Drop for Trace {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn probes_for_an_unused_filename() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("agios.0.trace"), b"").unwrap();
        let trace = Trace::init(dir.path(), "agios", "trace", 4096).unwrap();
        trace.add_request(0, "f", RequestType::Read, 0, 10);
        trace.flush();
        assert!(dir.path().join("agios.1.trace").exists());
    }

    #[test]
    fn flushes_once_buffer_crosses_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let trace = Trace::init(dir.path(), "agios", "trace", 8).unwrap();
        trace.add_request(0, "f", RequestType::Write, 0, 10);
        let path = dir.path().join("agios.0.trace");
        let mut contents = String::new();
        File::open(&path).unwrap().read_to_string(&mut contents).unwrap();
        assert!(contents.contains('W'));
    }
}
