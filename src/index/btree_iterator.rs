use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::{CrioError, PageId, RecordId, Result};

use super::btree_page::BTreeNodeRef;
use super::key_comparator::Key;

/// An ascending iterator over a [`super::BTreeIndex`]'s leaf chain.
///
/// Constructed via [`super::BTreeIndex::begin`], [`super::BTreeIndex::begin_at`]
/// or [`super::BTreeIndex::end`]. `current_page_id` is `None` for the end
/// sentinel, which yields nothing.
pub struct BTreeIterator {
    bpm: Arc<BufferPoolManager>,
    current_page_id: Option<PageId>,
    current_index: usize,
}

impl BTreeIterator {
    pub fn new(bpm: Arc<BufferPoolManager>, start: Option<PageId>, start_index: usize) -> Self {
        Self {
            bpm,
            current_page_id: start,
            current_index: start_index,
        }
    }

    /// Returns the next `(key, value)` pair in ascending order, or `None`
    /// once the leaf chain is exhausted.
    pub fn next(&mut self) -> Result<Option<(Key, RecordId)>> {
        while let Some(page_id) = self.current_page_id {
            let guard = self
                .bpm
                .checked_read_page(page_id)?
                .ok_or(CrioError::PageNotFound(page_id))?;
            let node = BTreeNodeRef::new(guard.data());

            if self.current_index < node.num_keys() as usize {
                let key = node.get_key(self.current_index);
                let value = node.get_value(self.current_index);
                self.current_index += 1;
                return Ok(Some((key, value)));
            }

            self.current_page_id = node.next_page_id();
            self.current_index = 0;
        }

        Ok(None)
    }
}

impl Iterator for BTreeIterator {
    type Item = Result<(Key, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        match BTreeIterator::next(self) {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
