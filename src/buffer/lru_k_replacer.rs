use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::common::FrameId;

/// Per-frame bookkeeping kept alongside the ordered lists.
#[derive(Debug, Clone, Copy)]
struct Entry {
    access_count: usize,
    evictable: bool,
}

/// Internal state protected by a single mutex: frames with fewer than `k`
/// accesses live in `history` (FIFO order, front is earliest-touched);
/// frames with `k` or more accesses live in `cache`, ordered by the
/// recency of their k-th most recent access (front is the frame with the
/// largest backward k-distance).
struct ReplacerState {
    entries: HashMap<FrameId, Entry>,
    history: VecDeque<FrameId>,
    cache: VecDeque<FrameId>,
    num_evictable: usize,
}

/// LRU-K Replacement Policy
///
/// The LRU-K algorithm evicts a frame whose backward k-distance is the
/// maximum of all evictable frames in the replacer. Backward k-distance is
/// the difference between the current timestamp and the timestamp of a
/// frame's k-th most recent access.
///
/// A frame with fewer than k historical accesses has +inf backward
/// k-distance; among such frames, the one with the earliest overall
/// access wins. History and cache are kept as two ordered lists so that
/// a frame crosses from one to the other exactly once, the moment its
/// access count reaches k.
pub struct LruKReplacer {
    k: usize,
    max_frames: usize,
    current_timestamp: AtomicU64,
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    /// Creates a new LRU-K replacer with the given k value and maximum frame count.
    pub fn new(k: usize, max_frames: usize) -> Self {
        Self {
            k,
            max_frames,
            current_timestamp: AtomicU64::new(0),
            state: Mutex::new(ReplacerState {
                entries: HashMap::new(),
                history: VecDeque::new(),
                cache: VecDeque::new(),
                num_evictable: 0,
            }),
        }
    }

    /// Evicts the frame with the largest backward k-distance, preferring
    /// history (+inf distance) frames over cache frames. Returns None if
    /// there are no evictable frames.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();

        if state.num_evictable == 0 {
            return None;
        }

        if let Some(pos) = state
            .history
            .iter()
            .position(|f| state.entries[f].evictable)
        {
            let frame_id = state.history.remove(pos).unwrap();
            state.entries.remove(&frame_id);
            state.num_evictable -= 1;
            return Some(frame_id);
        }

        if let Some(pos) = state.cache.iter().position(|f| state.entries[f].evictable) {
            let frame_id = state.cache.remove(pos).unwrap();
            state.entries.remove(&frame_id);
            state.num_evictable -= 1;
            return Some(frame_id);
        }

        None
    }

    /// Records that the given frame was accessed at the current timestamp.
    /// This method should be called after a page is pinned in the BufferPoolManager.
    pub fn record_access(&self, frame_id: FrameId) {
        if frame_id.as_usize() >= self.max_frames {
            return;
        }

        self.current_timestamp.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();

        let access_count = state.entries.get(&frame_id).map_or(0, |e| e.access_count) + 1;

        match state.entries.get_mut(&frame_id) {
            Some(entry) => entry.access_count = access_count,
            None => {
                state.entries.insert(
                    frame_id,
                    Entry {
                        access_count,
                        evictable: false,
                    },
                );
            }
        }

        if access_count < self.k {
            if access_count == 1 {
                state.history.push_back(frame_id);
            }
        } else if access_count == self.k {
            if let Some(pos) = state.history.iter().position(|f| *f == frame_id) {
                state.history.remove(pos);
            }
            state.cache.push_back(frame_id);
        } else {
            if let Some(pos) = state.cache.iter().position(|f| *f == frame_id) {
                state.cache.remove(pos);
            }
            state.cache.push_back(frame_id);
        }
    }

    /// Sets whether a frame is evictable.
    /// When a frame's pin count drops to 0, it should be marked as evictable.
    pub fn set_evictable(&self, frame_id: FrameId, is_evictable: bool) {
        if frame_id.as_usize() >= self.max_frames {
            return;
        }

        let mut state = self.state.lock();

        if let Some(entry) = state.entries.get_mut(&frame_id) {
            if entry.evictable != is_evictable {
                entry.evictable = is_evictable;
                if is_evictable {
                    state.num_evictable += 1;
                } else {
                    state.num_evictable -= 1;
                }
            }
        } else if is_evictable {
            state.entries.insert(
                frame_id,
                Entry {
                    access_count: 0,
                    evictable: true,
                },
            );
            state.history.push_back(frame_id);
            state.num_evictable += 1;
        }
    }

    /// Removes a frame from the replacer entirely.
    /// This should be called when a page is deleted from the BufferPoolManager.
    pub fn remove(&self, frame_id: FrameId) {
        let mut state = self.state.lock();

        let Some(entry) = state.entries.remove(&frame_id) else {
            return;
        };

        if let Some(pos) = state.history.iter().position(|f| *f == frame_id) {
            state.history.remove(pos);
        }
        if let Some(pos) = state.cache.iter().position(|f| *f == frame_id) {
            state.cache.remove(pos);
        }
        if entry.evictable {
            state.num_evictable -= 1;
        }
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.state.lock().num_evictable
    }

    /// Returns the k value of this replacer.
    pub fn k(&self) -> usize {
        self.k
    }
}
