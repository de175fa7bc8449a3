use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::BufferPoolManager;
use crate::common::{BTreeConfig, CrioError, PageId, RecordId, Result, HEADER_PAGE_ID};
use crate::storage::page::{HeaderPage, HeaderPageRef};

use super::btree_iterator::BTreeIterator;
use super::btree_page::{BTreeNode, BTreeNodeRef, InternalEntry, KeyValuePair};
use super::key_comparator::Key;

/// A disk-backed B+ tree index over a [`BufferPoolManager`].
///
/// Leaves form a doubly linked list in key order. Internal nodes store
/// entries where index 0 carries only a child pointer; the key at index
/// `i >= 1` separates the subtrees rooted at children `i - 1` and `i`.
/// Structural changes (splits, merges, root replacement) are serialized
/// behind a single tree-wide mutex guarding the root page id.
///
/// A tree created or opened by name keeps its root page id mirrored into
/// the header page (page 0) on every structural change that replaces the
/// root, so a later process can recover the tree by name alone.
pub struct BTreeIndex {
    root_page_id: Mutex<PageId>,
    bpm: Arc<BufferPoolManager>,
    config: BTreeConfig,
    name: Option<String>,
}

impl BTreeIndex {
    pub fn new(bpm: Arc<BufferPoolManager>) -> Result<Self> {
        Self::with_config(bpm, BTreeConfig::default())
    }

    pub fn with_config(bpm: Arc<BufferPoolManager>, config: BTreeConfig) -> Result<Self> {
        let root_page_id = Self::allocate_root_leaf(&bpm)?;

        Ok(Self {
            root_page_id: Mutex::new(root_page_id),
            bpm,
            config,
            name: None,
        })
    }

    pub fn open(root_page_id: PageId, bpm: Arc<BufferPoolManager>) -> Result<Self> {
        Ok(Self {
            root_page_id: Mutex::new(root_page_id),
            bpm,
            config: BTreeConfig::default(),
            name: None,
        })
    }

    /// Creates a new named index and records its root page id in the
    /// header page. Fails if `name` already has a record there.
    pub fn create(name: &str, bpm: Arc<BufferPoolManager>, config: BTreeConfig) -> Result<Self> {
        {
            let guard = bpm
                .checked_read_page(HEADER_PAGE_ID)?
                .ok_or(CrioError::PageNotFound(HEADER_PAGE_ID))?;
            let header = HeaderPageRef::new(guard.data());
            if header.get_root_id(name).is_some() {
                return Err(CrioError::IndexAlreadyExists(name.to_string()));
            }
        }

        let root_page_id = Self::allocate_root_leaf(&bpm)?;

        {
            let mut guard = bpm
                .checked_write_page(HEADER_PAGE_ID)?
                .ok_or(CrioError::PageNotFound(HEADER_PAGE_ID))?;
            let mut header = HeaderPage::new(guard.data_mut());
            if !header.insert_record(name, root_page_id.as_u32()) {
                return Err(CrioError::IndexAlreadyExists(name.to_string()));
            }
        }

        Ok(Self {
            root_page_id: Mutex::new(root_page_id),
            bpm,
            config,
            name: Some(name.to_string()),
        })
    }

    /// Opens a previously created named index, recovering its root page id
    /// from the header page.
    pub fn open_named(name: &str, bpm: Arc<BufferPoolManager>, config: BTreeConfig) -> Result<Self> {
        let root_page_id = {
            let guard = bpm
                .checked_read_page(HEADER_PAGE_ID)?
                .ok_or(CrioError::PageNotFound(HEADER_PAGE_ID))?;
            let header = HeaderPageRef::new(guard.data());
            header
                .get_root_id(name)
                .ok_or_else(|| CrioError::IndexNotFound(name.to_string()))?
        };

        Ok(Self {
            root_page_id: Mutex::new(PageId::new(root_page_id)),
            bpm,
            config,
            name: Some(name.to_string()),
        })
    }

    fn allocate_root_leaf(bpm: &Arc<BufferPoolManager>) -> Result<PageId> {
        let root_page_id = bpm.new_page()?;
        let mut guard = bpm
            .checked_write_page(root_page_id)?
            .ok_or(CrioError::PageNotFound(root_page_id))?;
        let mut node = BTreeNode::new(guard.data_mut());
        node.init(root_page_id, true);
        Ok(root_page_id)
    }

    /// Mirrors a new root page id into this index's header-page record, a
    /// no-op for anonymous (unnamed) indexes.
    fn sync_root_to_header(&self, new_root: PageId) -> Result<()> {
        let Some(name) = &self.name else {
            return Ok(());
        };
        let mut guard = self
            .bpm
            .checked_write_page(HEADER_PAGE_ID)?
            .ok_or(CrioError::PageNotFound(HEADER_PAGE_ID))?;
        let mut header = HeaderPage::new(guard.data_mut());
        if !header.update_record(name, new_root.as_u32()) {
            header.insert_record(name, new_root.as_u32());
        }
        Ok(())
    }

    pub fn root_page_id(&self) -> PageId {
        *self.root_page_id.lock()
    }

    fn read_node<T>(&self, page_id: PageId, f: impl FnOnce(&BTreeNodeRef) -> T) -> Result<T> {
        let guard = self
            .bpm
            .checked_read_page(page_id)?
            .ok_or(CrioError::PageNotFound(page_id))?;
        Ok(f(&BTreeNodeRef::new(guard.data())))
    }

    fn write_node<T>(&self, page_id: PageId, f: impl FnOnce(&mut BTreeNode) -> T) -> Result<T> {
        let mut guard = self
            .bpm
            .checked_write_page(page_id)?
            .ok_or(CrioError::PageNotFound(page_id))?;
        Ok(f(&mut BTreeNode::new(guard.data_mut())))
    }

    fn set_parent(&self, child_id: PageId, parent_id: Option<PageId>) -> Result<()> {
        self.write_node(child_id, |node| node.set_parent_page_id(parent_id))
    }

    fn find_leaf_from(&self, root: PageId, key: Key) -> Result<PageId> {
        let mut current = root;
        loop {
            let (is_leaf, next) = self.read_node(current, |node| {
                if node.is_leaf() {
                    (true, current)
                } else {
                    (false, node.get_child(node.find_child_index(key)))
                }
            })?;
            if is_leaf {
                return Ok(current);
            }
            current = next;
        }
    }

    fn find_leftmost_leaf_from(&self, root: PageId) -> Result<PageId> {
        let mut current = root;
        loop {
            let (is_leaf, next) = self.read_node(current, |node| {
                if node.is_leaf() {
                    (true, current)
                } else {
                    (false, node.get_child(0))
                }
            })?;
            if is_leaf {
                return Ok(current);
            }
            current = next;
        }
    }

    /// Looks up `key`, returning the record id stored for it, if any.
    pub fn get_value(&self, key: Key) -> Result<Option<RecordId>> {
        let root = self.root_page_id();
        let leaf_id = self.find_leaf_from(root, key)?;
        self.read_node(leaf_id, |node| {
            let pos = node.search_key(key);
            if pos < node.num_keys() as usize && node.get_key(pos) == key {
                Some(node.get_value(pos))
            } else {
                None
            }
        })
    }

    /// Inserts `key -> value`. Returns `Ok(false)` without modifying the
    /// tree if `key` is already present.
    pub fn insert(&self, key: Key, value: RecordId) -> Result<bool> {
        let mut root_guard = self.root_page_id.lock();
        let root = *root_guard;
        let leaf_id = self.find_leaf_from(root, key)?;

        let pairs = self.read_node(leaf_id, |node| node.leaf_pairs())?;
        if pairs.binary_search_by_key(&key, |p| p.key).is_ok() {
            return Ok(false);
        }

        let pos = pairs.partition_point(|p| p.key < key);
        let mut new_pairs = pairs;
        new_pairs.insert(pos, KeyValuePair { key, value });

        if new_pairs.len() < self.config.leaf_max_size {
            self.write_node(leaf_id, |node| node.set_leaf_pairs(&new_pairs))?;
            return Ok(true);
        }

        let mid = new_pairs.len() / 2;
        let left_pairs = new_pairs[..mid].to_vec();
        let right_pairs = new_pairs[mid..].to_vec();
        let separator = right_pairs[0].key;

        let (next_id, parent_id) =
            self.read_node(leaf_id, |node| (node.next_page_id(), node.parent_page_id()))?;

        let new_leaf_id = self.bpm.new_page()?;
        self.write_node(new_leaf_id, |node| {
            node.init(new_leaf_id, true);
            node.set_leaf_pairs(&right_pairs);
            node.set_parent_page_id(parent_id);
            node.set_next_page_id(next_id);
            node.set_prev_page_id(Some(leaf_id));
        })?;

        self.write_node(leaf_id, |node| {
            node.set_leaf_pairs(&left_pairs);
            node.set_next_page_id(Some(new_leaf_id));
        })?;

        if let Some(next_id) = next_id {
            self.write_node(next_id, |node| node.set_prev_page_id(Some(new_leaf_id)))?;
        }

        self.insert_into_parent(&mut root_guard, leaf_id, parent_id, separator, new_leaf_id)?;
        Ok(true)
    }

    /// Inserts `(separator, new_child)` into `left_id`'s parent, creating a
    /// new root if `left_id` had none. `parent_id` is the parent of
    /// `left_id` as observed before the split that produced `new_child`.
    fn insert_into_parent(
        &self,
        root_guard: &mut PageId,
        left_id: PageId,
        parent_id: Option<PageId>,
        separator: Key,
        new_child: PageId,
    ) -> Result<()> {
        let Some(parent_id) = parent_id else {
            let new_root_id = self.bpm.new_page()?;
            self.write_node(new_root_id, |node| {
                node.init(new_root_id, false);
                node.set_internal_entries(&[
                    InternalEntry {
                        key: 0,
                        child: left_id,
                    },
                    InternalEntry {
                        key: separator,
                        child: new_child,
                    },
                ]);
            })?;
            self.set_parent(left_id, Some(new_root_id))?;
            self.set_parent(new_child, Some(new_root_id))?;
            self.sync_root_to_header(new_root_id)?;
            *root_guard = new_root_id;
            return Ok(());
        };

        let entries = self.read_node(parent_id, |node| node.internal_entries())?;
        let left_idx = entries
            .iter()
            .position(|e| e.child == left_id)
            .expect("left child must be present in its parent");

        let mut new_entries = entries;
        new_entries.insert(
            left_idx + 1,
            InternalEntry {
                key: separator,
                child: new_child,
            },
        );

        if new_entries.len() < self.config.internal_max_size {
            self.write_node(parent_id, |node| node.set_internal_entries(&new_entries))?;
            self.set_parent(new_child, Some(parent_id))?;
            return Ok(());
        }

        let mid = new_entries.len() / 2;
        let parent_separator = new_entries[mid].key;
        let left_entries = new_entries[..mid].to_vec();
        let mut right_entries = new_entries[mid..].to_vec();
        right_entries[0].key = 0;

        let grandparent_id = self.read_node(parent_id, |node| node.parent_page_id())?;

        let new_internal_id = self.bpm.new_page()?;
        self.write_node(new_internal_id, |node| {
            node.init(new_internal_id, false);
            node.set_internal_entries(&right_entries);
            node.set_parent_page_id(grandparent_id);
        })?;
        for entry in &right_entries {
            self.set_parent(entry.child, Some(new_internal_id))?;
        }

        self.write_node(parent_id, |node| node.set_internal_entries(&left_entries))?;
        self.set_parent(new_child, Some(parent_id))?;

        self.insert_into_parent(
            root_guard,
            parent_id,
            grandparent_id,
            parent_separator,
            new_internal_id,
        )
    }

    /// Removes `key`, rebalancing via sibling steals and merges. A no-op if
    /// `key` is absent.
    pub fn remove(&self, key: Key) -> Result<()> {
        let mut root_guard = self.root_page_id.lock();
        let root = *root_guard;
        let leaf_id = self.find_leaf_from(root, key)?;

        let mut pairs = self.read_node(leaf_id, |node| node.leaf_pairs())?;
        let Ok(pos) = pairs.binary_search_by_key(&key, |p| p.key) else {
            return Ok(());
        };
        pairs.remove(pos);
        self.write_node(leaf_id, |node| node.set_leaf_pairs(&pairs))?;

        if leaf_id == root || pairs.len() >= self.config.leaf_min_size() {
            return Ok(());
        }

        self.fix_leaf_underflow(&mut root_guard, leaf_id)
    }

    fn fix_leaf_underflow(&self, root_guard: &mut PageId, leaf_id: PageId) -> Result<()> {
        let parent_id = self
            .read_node(leaf_id, |node| node.parent_page_id())?
            .expect("non-root leaf must have a parent");
        let entries = self.read_node(parent_id, |node| node.internal_entries())?;
        let child_idx = entries
            .iter()
            .position(|e| e.child == leaf_id)
            .expect("leaf must be present in its parent");

        if child_idx > 0 {
            let left_id = entries[child_idx - 1].child;
            let mut left_pairs = self.read_node(left_id, |node| node.leaf_pairs())?;
            if left_pairs.len() > self.config.leaf_min_size() {
                let stolen = left_pairs.pop().unwrap();
                self.write_node(left_id, |node| node.set_leaf_pairs(&left_pairs))?;

                let mut pairs = self.read_node(leaf_id, |node| node.leaf_pairs())?;
                pairs.insert(0, stolen);
                self.write_node(leaf_id, |node| node.set_leaf_pairs(&pairs))?;

                let new_separator = pairs[0].key;
                let mut new_entries = entries;
                new_entries[child_idx].key = new_separator;
                return self.write_node(parent_id, |node| node.set_internal_entries(&new_entries));
            }
        }

        if child_idx + 1 < entries.len() {
            let right_id = entries[child_idx + 1].child;
            let mut right_pairs = self.read_node(right_id, |node| node.leaf_pairs())?;
            if right_pairs.len() > self.config.leaf_min_size() {
                let stolen = right_pairs.remove(0);
                self.write_node(right_id, |node| node.set_leaf_pairs(&right_pairs))?;

                let mut pairs = self.read_node(leaf_id, |node| node.leaf_pairs())?;
                pairs.push(stolen);
                self.write_node(leaf_id, |node| node.set_leaf_pairs(&pairs))?;

                let new_separator = right_pairs[0].key;
                let mut new_entries = entries;
                new_entries[child_idx + 1].key = new_separator;
                return self.write_node(parent_id, |node| node.set_internal_entries(&new_entries));
            }
        }

        if child_idx > 0 {
            let left_id = entries[child_idx - 1].child;
            self.merge_leaves(left_id, leaf_id)?;
            let mut new_entries = entries;
            new_entries.remove(child_idx);
            self.write_node(parent_id, |node| node.set_internal_entries(&new_entries))?;
        } else {
            let right_id = entries[child_idx + 1].child;
            self.merge_leaves(leaf_id, right_id)?;
            let mut new_entries = entries;
            new_entries.remove(child_idx + 1);
            self.write_node(parent_id, |node| node.set_internal_entries(&new_entries))?;
        }

        if parent_id == *root_guard {
            return self.fix_root_underflow(root_guard, parent_id);
        }

        let new_size = self.read_node(parent_id, |node| node.num_keys() as usize)?;
        if new_size < self.config.internal_min_size() {
            self.fix_internal_underflow(root_guard, parent_id)
        } else {
            Ok(())
        }
    }

    /// Merges `right_id`'s entries into `left_id` and unlinks `right_id`
    /// from the leaf chain, deallocating its page.
    fn merge_leaves(&self, left_id: PageId, right_id: PageId) -> Result<()> {
        let right_pairs = self.read_node(right_id, |node| node.leaf_pairs())?;
        let next_id = self.read_node(right_id, |node| node.next_page_id())?;

        let mut left_pairs = self.read_node(left_id, |node| node.leaf_pairs())?;
        left_pairs.extend(right_pairs);
        self.write_node(left_id, |node| {
            node.set_leaf_pairs(&left_pairs);
            node.set_next_page_id(next_id);
        })?;

        if let Some(next_id) = next_id {
            self.write_node(next_id, |node| node.set_prev_page_id(Some(left_id)))?;
        }

        self.bpm.delete_page(right_id)?;
        Ok(())
    }

    fn fix_internal_underflow(&self, root_guard: &mut PageId, node_id: PageId) -> Result<()> {
        let parent_id = self
            .read_node(node_id, |node| node.parent_page_id())?
            .expect("non-root internal node must have a parent");
        let parent_entries = self.read_node(parent_id, |node| node.internal_entries())?;
        let child_idx = parent_entries
            .iter()
            .position(|e| e.child == node_id)
            .expect("node must be present in its parent");

        if child_idx > 0 {
            let left_id = parent_entries[child_idx - 1].child;
            let left_entries = self.read_node(left_id, |node| node.internal_entries())?;
            if left_entries.len() > self.config.internal_min_size() {
                return self.steal_from_left_internal(
                    parent_id,
                    parent_entries,
                    child_idx,
                    left_id,
                    left_entries,
                    node_id,
                );
            }
        }

        if child_idx + 1 < parent_entries.len() {
            let right_id = parent_entries[child_idx + 1].child;
            let right_entries = self.read_node(right_id, |node| node.internal_entries())?;
            if right_entries.len() > self.config.internal_min_size() {
                return self.steal_from_right_internal(
                    parent_id,
                    parent_entries,
                    child_idx,
                    node_id,
                    right_id,
                    right_entries,
                );
            }
        }

        if child_idx > 0 {
            let left_id = parent_entries[child_idx - 1].child;
            self.merge_internal(parent_id, &parent_entries, child_idx - 1, left_id, node_id)?;
            let mut new_entries = parent_entries;
            new_entries.remove(child_idx);
            self.write_node(parent_id, |node| node.set_internal_entries(&new_entries))?;
        } else {
            let right_id = parent_entries[child_idx + 1].child;
            self.merge_internal(parent_id, &parent_entries, child_idx, node_id, right_id)?;
            let mut new_entries = parent_entries;
            new_entries.remove(child_idx + 1);
            self.write_node(parent_id, |node| node.set_internal_entries(&new_entries))?;
        }

        if parent_id == *root_guard {
            self.fix_root_underflow(root_guard, parent_id)
        } else {
            let new_size = self.read_node(parent_id, |node| node.num_keys() as usize)?;
            if new_size < self.config.internal_min_size() {
                self.fix_internal_underflow(root_guard, parent_id)
            } else {
                Ok(())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn steal_from_left_internal(
        &self,
        parent_id: PageId,
        parent_entries: Vec<InternalEntry>,
        child_idx: usize,
        left_id: PageId,
        mut left_entries: Vec<InternalEntry>,
        node_id: PageId,
    ) -> Result<()> {
        let moved = left_entries.pop().unwrap();
        let separator = parent_entries[child_idx].key;

        let mut node_entries = self.read_node(node_id, |node| node.internal_entries())?;
        node_entries.insert(
            0,
            InternalEntry {
                key: 0,
                child: moved.child,
            },
        );
        node_entries[1].key = separator;

        self.write_node(left_id, |node| node.set_internal_entries(&left_entries))?;
        self.write_node(node_id, |node| node.set_internal_entries(&node_entries))?;
        self.set_parent(moved.child, Some(node_id))?;

        let mut new_parent_entries = parent_entries;
        new_parent_entries[child_idx].key = moved.key;
        self.write_node(parent_id, |node| node.set_internal_entries(&new_parent_entries))
    }

    fn steal_from_right_internal(
        &self,
        parent_id: PageId,
        parent_entries: Vec<InternalEntry>,
        child_idx: usize,
        node_id: PageId,
        right_id: PageId,
        mut right_entries: Vec<InternalEntry>,
    ) -> Result<()> {
        let moved = right_entries.remove(0);
        let separator = parent_entries[child_idx + 1].key;
        let new_right_separator = right_entries[0].key;
        right_entries[0].key = 0;

        let mut node_entries = self.read_node(node_id, |node| node.internal_entries())?;
        node_entries.push(InternalEntry {
            key: separator,
            child: moved.child,
        });

        self.write_node(node_id, |node| node.set_internal_entries(&node_entries))?;
        self.write_node(right_id, |node| node.set_internal_entries(&right_entries))?;
        self.set_parent(moved.child, Some(node_id))?;

        let mut new_parent_entries = parent_entries;
        new_parent_entries[child_idx + 1].key = new_right_separator;
        self.write_node(parent_id, |node| node.set_internal_entries(&new_parent_entries))
    }

    fn merge_internal(
        &self,
        parent_id: PageId,
        parent_entries: &[InternalEntry],
        left_slot: usize,
        left_id: PageId,
        right_id: PageId,
    ) -> Result<()> {
        let separator = parent_entries[left_slot + 1].key;
        let mut left_entries = self.read_node(left_id, |node| node.internal_entries())?;
        let boundary = left_entries.len();
        let mut right_entries = self.read_node(right_id, |node| node.internal_entries())?;
        right_entries[0].key = separator;
        left_entries.append(&mut right_entries);

        for entry in &left_entries[boundary..] {
            self.set_parent(entry.child, Some(left_id))?;
        }

        self.write_node(left_id, |node| node.set_internal_entries(&left_entries))?;
        self.bpm.delete_page(right_id)?;
        Ok(())
    }

    fn fix_root_underflow(&self, root_guard: &mut PageId, root_id: PageId) -> Result<()> {
        let num_entries = self.read_node(root_id, |node| node.num_keys())?;
        if num_entries > 1 {
            return Ok(());
        }

        let only_child = self.read_node(root_id, |node| node.get_child(0))?;
        self.set_parent(only_child, None)?;
        self.bpm.delete_page(root_id)?;
        self.sync_root_to_header(only_child)?;
        *root_guard = only_child;
        Ok(())
    }

    /// Returns an iterator positioned at the leftmost entry in the tree.
    pub fn begin(&self) -> Result<BTreeIterator> {
        let root = self.root_page_id();
        let leaf_id = self.find_leftmost_leaf_from(root)?;
        Ok(BTreeIterator::new(self.bpm.clone(), Some(leaf_id), 0))
    }

    /// Returns an iterator positioned at the first entry with a key `>= k`.
    pub fn begin_at(&self, key: Key) -> Result<BTreeIterator> {
        let root = self.root_page_id();
        let leaf_id = self.find_leaf_from(root, key)?;
        let index = self.read_node(leaf_id, |node| node.search_key(key))?;
        Ok(BTreeIterator::new(self.bpm.clone(), Some(leaf_id), index))
    }

    /// Returns the sentinel end iterator.
    pub fn end(&self) -> BTreeIterator {
        BTreeIterator::new(self.bpm.clone(), None, 0)
    }

    /// Walks every node reachable from the root and checks that each
    /// non-root node's size falls within `[min_size, max_size - 1]`.
    /// Returns the first violation found, if any.
    pub fn check_invariants(&self) -> Result<()> {
        let root = self.root_page_id();
        self.check_node_invariants(root, true)
    }

    fn check_node_invariants(&self, page_id: PageId, is_root: bool) -> Result<()> {
        let (is_leaf, size, children) = self.read_node(page_id, |node| {
            if node.is_leaf() {
                (true, node.num_keys() as usize, Vec::new())
            } else {
                let entries = node.internal_entries();
                let children: Vec<PageId> = entries.iter().map(|e| e.child).collect();
                (false, entries.len(), children)
            }
        })?;

        if !is_root {
            let (min_size, max_size) = if is_leaf {
                (self.config.leaf_min_size(), self.config.leaf_max_size)
            } else {
                (self.config.internal_min_size(), self.config.internal_max_size)
            };
            if size < min_size || size > max_size - 1 {
                return Err(CrioError::IndexCorrupted(format!(
                    "page {} has size {} outside [{}, {}]",
                    page_id.as_u32(),
                    size,
                    min_size,
                    max_size - 1
                )));
            }
        }

        for child in children {
            self.check_node_invariants(child, false)?;
        }

        Ok(())
    }

    /// Returns `(internal_node_count, leaf_node_count)` for the tree
    /// reachable from the root, counted via a full traversal.
    pub fn shape(&self) -> Result<(usize, usize)> {
        let root = self.root_page_id();
        let mut internal = 0;
        let mut leaves = 0;
        self.count_shape(root, &mut internal, &mut leaves)?;
        Ok((internal, leaves))
    }

    fn count_shape(&self, page_id: PageId, internal: &mut usize, leaves: &mut usize) -> Result<()> {
        let (is_leaf, children) = self.read_node(page_id, |node| {
            if node.is_leaf() {
                (true, Vec::new())
            } else {
                (false, node.internal_entries().iter().map(|e| e.child).collect())
            }
        })?;

        if is_leaf {
            *leaves += 1;
        } else {
            *internal += 1;
            for child in children {
                self.count_shape(child, internal, leaves)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{PageId, RecordId, SlotId};
    use crate::storage::disk::DiskManager;
    use tempfile::NamedTempFile;

    fn make_index(leaf_max: usize, internal_max: usize) -> (BTreeIndex, Arc<BufferPoolManager>) {
        let temp_file = NamedTempFile::new().unwrap();
        let disk_manager = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(64, 2, disk_manager));
        let config = BTreeConfig::new(leaf_max, internal_max);
        let index = BTreeIndex::with_config(bpm.clone(), config).unwrap();
        (index, bpm)
    }

    fn record(id: u32) -> RecordId {
        RecordId::new(PageId::new(id), SlotId::new(0))
    }

    #[test]
    fn test_insert_and_get_value() {
        let (index, _bpm) = make_index(128, 128);
        index.insert(10, record(1)).unwrap();
        index.insert(20, record(2)).unwrap();
        index.insert(30, record(3)).unwrap();

        assert_eq!(index.get_value(10).unwrap(), Some(record(1)));
        assert_eq!(index.get_value(20).unwrap(), Some(record(2)));
        assert_eq!(index.get_value(30).unwrap(), Some(record(3)));
        assert_eq!(index.get_value(40).unwrap(), None);
    }

    #[test]
    fn test_duplicate_insert_is_noop() {
        let (index, _bpm) = make_index(128, 128);
        assert!(index.insert(10, record(1)).unwrap());
        assert!(!index.insert(10, record(2)).unwrap());
        assert_eq!(index.get_value(10).unwrap(), Some(record(1)));
    }

    /// Asserts every non-root node's size sits within
    /// `[min_size, max_size - 1]`, panicking with the violation if not.
    fn assert_invariants(index: &BTreeIndex) {
        index.check_invariants().unwrap();
    }

    #[test]
    fn test_scan_is_ascending_regardless_of_insertion_order() {
        let (index, _bpm) = make_index(4, 4);
        for &k in &[5u32, 9, 1, 3, 7, 11] {
            index.insert(k, record(k)).unwrap();
            assert_invariants(&index);
        }

        // After these six inserts the leaf splits triggered by 3 and 11
        // leave one internal root over three leaves, linked left to right.
        let (internal, leaves) = index.shape().unwrap();
        assert_eq!(internal, 1);
        assert_eq!(leaves, 3);

        for &k in &[2u32, 4] {
            index.insert(k, record(k)).unwrap();
            assert_invariants(&index);
        }

        let mut iter = index.begin().unwrap();
        let mut seen = Vec::new();
        while let Some((k, _)) = iter.next().unwrap() {
            seen.push(k);
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5, 7, 9, 11]);
    }

    #[test]
    fn test_delete_triggers_rebalance() {
        let (index, _bpm) = make_index(4, 4);
        for &k in &[5u32, 9, 1, 3, 7, 11, 2, 4] {
            index.insert(k, record(k)).unwrap();
            assert_invariants(&index);
        }

        index.remove(3).unwrap();
        assert_invariants(&index);
        index.remove(4).unwrap();
        assert_invariants(&index);

        assert_eq!(index.get_value(3).unwrap(), None);
        assert_eq!(index.get_value(4).unwrap(), None);

        let mut iter = index.begin().unwrap();
        let mut seen = Vec::new();
        while let Some((k, _)) = iter.next().unwrap() {
            seen.push(k);
        }
        assert_eq!(seen, vec![1, 2, 5, 7, 9, 11]);
    }

    #[test]
    fn test_remove_missing_key_is_noop() {
        let (index, _bpm) = make_index(128, 128);
        index.insert(1, record(1)).unwrap();
        index.remove(999).unwrap();
        assert_eq!(index.get_value(1).unwrap(), Some(record(1)));
    }

    #[test]
    fn test_begin_at_skips_to_key() {
        let (index, _bpm) = make_index(4, 4);
        for k in 0..20u32 {
            index.insert(k, record(k)).unwrap();
        }

        let mut iter = index.begin_at(15).unwrap();
        let (k, _) = iter.next().unwrap().unwrap();
        assert_eq!(k, 15);
    }

    #[test]
    fn test_end_iterator_is_immediately_exhausted() {
        let (index, _bpm) = make_index(128, 128);
        index.insert(1, record(1)).unwrap();
        let mut iter = index.end();
        assert_eq!(iter.next().unwrap(), None);
    }

    #[test]
    fn test_many_inserts_and_deletes_preserve_order() {
        let (index, _bpm) = make_index(4, 4);
        let keys: Vec<u32> = (0..64).collect();
        for &k in &keys {
            assert!(index.insert(k, record(k)).unwrap());
        }
        for k in (0..64u32).step_by(3) {
            index.remove(k).unwrap();
        }

        let remaining: Vec<u32> = keys.into_iter().filter(|k| k % 3 != 0).collect();
        let mut iter = index.begin().unwrap();
        let mut seen = Vec::new();
        while let Some((k, _)) = iter.next().unwrap() {
            seen.push(k);
        }
        assert_eq!(seen, remaining);
    }

    #[test]
    fn test_create_duplicate_name_fails() {
        let temp_file = NamedTempFile::new().unwrap();
        let disk_manager = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(64, 2, disk_manager));

        BTreeIndex::create("ix", bpm.clone(), BTreeConfig::default()).unwrap();
        let err = BTreeIndex::create("ix", bpm, BTreeConfig::default()).unwrap_err();
        assert!(matches!(err, CrioError::IndexAlreadyExists(name) if name == "ix"));
    }

    #[test]
    fn test_open_named_missing_fails() {
        let temp_file = NamedTempFile::new().unwrap();
        let disk_manager = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(64, 2, disk_manager));

        let err = BTreeIndex::open_named("ghost", bpm, BTreeConfig::default()).unwrap_err();
        assert!(matches!(err, CrioError::IndexNotFound(name) if name == "ghost"));
    }

    #[test]
    fn test_named_index_survives_restart_and_root_changes() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_path_buf();
        let config = BTreeConfig::new(4, 4);

        {
            let disk_manager = Arc::new(DiskManager::new(&path).unwrap());
            let bpm = Arc::new(BufferPoolManager::new(64, 2, disk_manager));
            let index = BTreeIndex::create("my_ix", bpm.clone(), config).unwrap();
            for k in 0..40u32 {
                assert!(index.insert(k, record(k)).unwrap());
            }
            bpm.flush_all_pages().unwrap();
        }

        {
            let disk_manager = Arc::new(DiskManager::new(&path).unwrap());
            let bpm = Arc::new(BufferPoolManager::new(64, 2, disk_manager));
            let index = BTreeIndex::open_named("my_ix", bpm, config).unwrap();
            for k in 0..40u32 {
                assert_eq!(index.get_value(k).unwrap(), Some(record(k)));
            }
        }
    }
}
