//! Fixed 64-bucket index over `File`s, one `parking_lot::Mutex` per bucket.
//! Ported from `original_source/src/hash.c` (`calculate_hash`,
//! `get_hashtable_position`) and `req_hashtable.c`.

use parking_lot::Mutex;

use crate::file::File;

/// Bucket count, matching the source's `AGIOS_HASH_ENTRIES`.
pub const HASHTABLE_SIZE: usize = 64;

/// Sums the bytes of `file_id`, mixes with a multiply/shift, and folds into
/// `[0, HASHTABLE_SIZE)`. Ported verbatim from `hash.c::calculate_hash` and
/// `get_hashtable_position`.
pub fn bucket_of(file_id: &str) -> usize {
    let sum: u64 = file_id.bytes().map(|b| b as u64).sum();
    let mixed = sum.wrapping_mul(2654435761).wrapping_shr(6);
    (mixed as usize) % HASHTABLE_SIZE
}

struct Bucket {
    files: Mutex<Vec<File>>,
}

impl Bucket {
    fn new() -> Self {
        Bucket {
            files: Mutex::new(Vec::new()),
        }
    }
}

/// The hashtable index, used when the active policy has `uses_hashtable() == true`.
pub struct Hashtable {
    buckets: Vec<Bucket>,
}

impl Hashtable {
    pub fn new() -> Self {
        let mut buckets = Vec::with_capacity(HASHTABLE_SIZE);
        for _ in 0..HASHTABLE_SIZE {
            buckets.push(Bucket::new());
        }
        Hashtable { buckets }
    }

    /// Runs `f` with the bucket owning `file_id` locked, creating the
    /// `File` entry (file-id-ordered, per invariant) on first access.
    pub fn with_file_or_insert<R>(
        &self,
        file_id: &str,
        initial_quantum: u64,
        f: impl FnOnce(&mut File) -> R,
    ) -> R {
        let bucket = &self.buckets[bucket_of(file_id)];
        let mut files = bucket.files.lock();
        let pos = files.partition_point(|existing| existing.file_id.as_str() < file_id);
        if pos >= files.len() || files[pos].file_id != file_id {
            files.insert(pos, File::new(file_id.to_string(), initial_quantum));
        }
        f(&mut files[pos])
    }

    /// Runs `f` with the bucket owning `file_id` locked, only if the file
    /// already exists. Used by release/cancel paths, which must not
    /// materialize files that were never added.
    pub fn with_existing_file<R>(
        &self,
        file_id: &str,
        f: impl FnOnce(&mut File) -> R,
    ) -> Option<R> {
        let bucket = &self.buckets[bucket_of(file_id)];
        let mut files = bucket.files.lock();
        let pos = files.partition_point(|existing| existing.file_id.as_str() < file_id);
        if pos < files.len() && files[pos].file_id == file_id {
            Some(f(&mut files[pos]))
        } else {
            None
        }
    }

    /// Iterates every file across all 64 buckets, briefly locking each in
    /// turn. Ported from `SJF.c::SJF_get_shortest_job`'s scan pattern;
    /// callers accept that a file's state may change between visits.
    pub fn for_each_file<R>(&self, mut visit: impl FnMut(&mut File) -> Option<R>) -> Option<R> {
        for bucket in &self.buckets {
            let mut files = bucket.files.lock();
            for file in files.iter_mut() {
                if let Some(r) = visit(file) {
                    return Some(r);
                }
            }
        }
        None
    }
}

impl Default for Hashtable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_of_is_stable_and_in_range() {
        for id in ["a", "file-12", "some/long/path.bin", ""] {
            let b = bucket_of(id);
            assert!(b < HASHTABLE_SIZE);
            assert_eq!(b, bucket_of(id));
        }
    }

    #[test]
    fn with_file_or_insert_creates_once() {
        let ht = Hashtable::new();
        ht.with_file_or_insert("a", 8192, |f| f.pending_reqnb += 1);
        ht.with_file_or_insert("a", 8192, |f| f.pending_reqnb += 1);
        let total = ht.with_existing_file("a", |f| f.pending_reqnb).unwrap();
        assert_eq!(total, 2);
    }

    #[test]
    fn with_existing_file_misses_unknown_file() {
        let ht = Hashtable::new();
        assert!(ht.with_existing_file("missing", |_| ()).is_none());
    }
}
