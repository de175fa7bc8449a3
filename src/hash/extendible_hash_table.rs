use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

struct Bucket<K, V> {
    local_depth: u32,
    entries: Vec<(K, V)>,
}

impl<K, V> Bucket<K, V>
where
    K: PartialEq,
{
    fn new(local_depth: u32) -> Self {
        Self {
            local_depth,
            entries: Vec::new(),
        }
    }

    fn find(&self, key: &K) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    fn is_full(&self, bucket_size: usize) -> bool {
        self.entries.len() >= bucket_size
    }
}

/// A concurrent extendible hash table, mapping keys to values with
/// amortized O(1) lookup, insert and remove. Used by the buffer pool as
/// its page table.
///
/// The directory doubles when a bucket whose local depth equals the
/// current global depth overflows; otherwise the overflowing bucket is
/// split in place and only the directory entries that aliased it are
/// repointed.
pub struct ExtendibleHashTable<K, V> {
    bucket_size: usize,
    global_depth: AtomicU32,
    num_buckets: AtomicU32,
    directory: RwLock<Vec<Arc<RwLock<Bucket<K, V>>>>>,
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(bucket_size: usize) -> Self {
        assert!(bucket_size > 0, "bucket_size must be positive");
        let bucket = Arc::new(RwLock::new(Bucket::new(0)));
        Self {
            bucket_size,
            global_depth: AtomicU32::new(0),
            num_buckets: AtomicU32::new(1),
            directory: RwLock::new(vec![bucket]),
        }
    }

    fn hash(key: &K) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    fn index_of(hash: u64, global_depth: u32) -> usize {
        if global_depth == 0 {
            return 0;
        }
        (hash & ((1u64 << global_depth) - 1)) as usize
    }

    /// Looks up `key`, returning a clone of its value if present.
    pub fn find(&self, key: &K) -> Option<V> {
        let bucket = self.bucket_for(key);
        let guard = bucket.read();
        guard.find(key).cloned()
    }

    /// Removes `key`, returning whether it was present.
    pub fn remove(&self, key: &K) -> bool {
        let bucket = self.bucket_for(key);
        let mut guard = bucket.write();
        guard.remove(key).is_some()
    }

    fn bucket_for(&self, key: &K) -> Arc<RwLock<Bucket<K, V>>> {
        let hash = Self::hash(key);
        let dir = self.directory.read();
        let gd = self.global_depth.load(Ordering::Acquire);
        let idx = Self::index_of(hash, gd);
        Arc::clone(&dir[idx])
    }

    /// Inserts `key -> value`, overwriting any existing value for `key`.
    /// Splits and, if needed, doubles the directory until the insert fits.
    pub fn insert(&self, key: K, value: V) {
        loop {
            let bucket = self.bucket_for(&key);
            {
                let mut guard = bucket.write();
                if let Some(slot) = guard.entries.iter_mut().find(|(k, _)| k == &key) {
                    slot.1 = value;
                    return;
                }
                if !guard.is_full(self.bucket_size) {
                    guard.entries.push((key, value));
                    return;
                }
            }
            self.split(&key);
        }
    }

    /// Splits the bucket that currently owns `key`, growing the directory
    /// first if the bucket's local depth has caught up to the global depth.
    fn split(&self, key: &K) {
        let mut dir = self.directory.write();
        let hash = Self::hash(key);
        let gd = self.global_depth.load(Ordering::Acquire);
        let idx = Self::index_of(hash, gd);
        let old_bucket = Arc::clone(&dir[idx]);

        // A concurrent splitter may have already relieved this bucket.
        if old_bucket.read().entries.len() < self.bucket_size {
            return;
        }

        let local_depth = old_bucket.read().local_depth;

        if local_depth == gd {
            let mut grown = Vec::with_capacity(dir.len() * 2);
            for slot in dir.iter() {
                grown.push(Arc::clone(slot));
                grown.push(Arc::clone(slot));
            }
            *dir = grown;
            self.global_depth.store(gd + 1, Ordering::Release);
        }

        let new_local_depth = local_depth + 1;
        let new_bucket = Arc::new(RwLock::new(Bucket::new(new_local_depth)));
        let split_bit = 1u64 << (new_local_depth - 1);

        {
            let mut old_guard = old_bucket.write();
            old_guard.local_depth = new_local_depth;

            let mut kept = Vec::new();
            let mut moved = Vec::new();
            for (k, v) in old_guard.entries.drain(..) {
                if Self::hash(&k) & split_bit != 0 {
                    moved.push((k, v));
                } else {
                    kept.push((k, v));
                }
            }
            old_guard.entries = kept;
            new_bucket.write().entries = moved;
        }

        let dir_bit = split_bit as usize;
        for (i, slot) in dir.iter_mut().enumerate() {
            if Arc::ptr_eq(slot, &old_bucket) && (i & dir_bit) != 0 {
                *slot = Arc::clone(&new_bucket);
            }
        }

        self.num_buckets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_global_depth(&self) -> u32 {
        self.global_depth.load(Ordering::Acquire)
    }

    pub fn get_num_buckets(&self) -> u32 {
        self.num_buckets.load(Ordering::Relaxed)
    }

    pub fn get_local_depth(&self, key: &K) -> u32 {
        self.bucket_for(key).read().local_depth
    }

    pub fn len(&self) -> usize {
        let dir = self.directory.read();
        let mut seen: Vec<usize> = Vec::new();
        let mut total = 0;
        for slot in dir.iter() {
            let ptr = Arc::as_ptr(slot) as usize;
            if !seen.contains(&ptr) {
                seen.push(ptr);
                total += slot.read().entries.len();
            }
        }
        total
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a snapshot of every key-value pair currently stored.
    pub fn entries(&self) -> Vec<(K, V)> {
        let dir = self.directory.read();
        let mut seen: Vec<usize> = Vec::new();
        let mut out = Vec::new();
        for slot in dir.iter() {
            let ptr = Arc::as_ptr(slot) as usize;
            if !seen.contains(&ptr) {
                seen.push(ptr);
                out.extend(slot.read().entries.iter().cloned());
            }
        }
        out
    }
}
