use crate::common::{PageId, RecordId, SlotId, PAGE_SIZE};

use super::key_comparator::Key;

const HEADER_SIZE: usize = 20;

const PAGE_ID_OFFSET: usize = 0;
const IS_LEAF_OFFSET: usize = 4;
const NUM_KEYS_OFFSET: usize = 5;
const NEXT_PAGE_OFFSET: usize = 8;
const PREV_PAGE_OFFSET: usize = 12;
const PARENT_PAGE_OFFSET: usize = 16;

const INVALID_PAGE: u32 = u32::MAX;

const KEY_SIZE: usize = 4;
const VALUE_SIZE: usize = 6; // RecordId: PageId(4) + SlotId(2)
const CHILD_SIZE: usize = 4; // PageId

const LEAF_ENTRY_SIZE: usize = KEY_SIZE + VALUE_SIZE;
const INTERNAL_ENTRY_SIZE: usize = KEY_SIZE + CHILD_SIZE;

/// A leaf entry: a key paired with the record id it points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyValuePair {
    pub key: Key,
    pub value: RecordId,
}

/// An internal entry: a separator key paired with the child page it
/// guards. The entry at index 0 carries only a valid child pointer; its
/// key slot is serialized but never read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternalEntry {
    pub key: Key,
    pub child: PageId,
}

/// Mutable view over a B+ tree node page. Leaf nodes store
/// `(key, RecordId)` pairs; internal nodes store `(key, child page id)`
/// entries where the key at index 0 is a placeholder.
pub struct BTreeNode<'a> {
    data: &'a mut [u8],
}

impl<'a> BTreeNode<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn init(&mut self, page_id: PageId, is_leaf: bool) {
        self.data.fill(0);
        self.set_page_id(page_id);
        self.set_is_leaf(is_leaf);
        self.set_num_keys(0);
        self.set_next_page_id(None);
        self.set_prev_page_id(None);
        self.set_parent_page_id(None);
    }

    pub fn page_id(&self) -> PageId {
        let bytes: [u8; 4] = self.data[PAGE_ID_OFFSET..PAGE_ID_OFFSET + 4]
            .try_into()
            .unwrap();
        PageId::new(u32::from_le_bytes(bytes))
    }

    fn set_page_id(&mut self, page_id: PageId) {
        let bytes = page_id.as_u32().to_le_bytes();
        self.data[PAGE_ID_OFFSET..PAGE_ID_OFFSET + 4].copy_from_slice(&bytes);
    }

    pub fn is_leaf(&self) -> bool {
        self.data[IS_LEAF_OFFSET] == 1
    }

    fn set_is_leaf(&mut self, is_leaf: bool) {
        self.data[IS_LEAF_OFFSET] = if is_leaf { 1 } else { 0 };
    }

    /// Entry count: number of `(key, value)` pairs for a leaf, number of
    /// `(key, child)` entries (== number of children) for an internal node.
    pub fn num_keys(&self) -> u16 {
        let bytes: [u8; 2] = self.data[NUM_KEYS_OFFSET..NUM_KEYS_OFFSET + 2]
            .try_into()
            .unwrap();
        u16::from_le_bytes(bytes)
    }

    fn set_num_keys(&mut self, num: u16) {
        let bytes = num.to_le_bytes();
        self.data[NUM_KEYS_OFFSET..NUM_KEYS_OFFSET + 2].copy_from_slice(&bytes);
    }

    pub fn next_page_id(&self) -> Option<PageId> {
        read_optional_page_id(self.data, NEXT_PAGE_OFFSET)
    }

    pub fn set_next_page_id(&mut self, page_id: Option<PageId>) {
        write_optional_page_id(self.data, NEXT_PAGE_OFFSET, page_id);
    }

    pub fn prev_page_id(&self) -> Option<PageId> {
        read_optional_page_id(self.data, PREV_PAGE_OFFSET)
    }

    pub fn set_prev_page_id(&mut self, page_id: Option<PageId>) {
        write_optional_page_id(self.data, PREV_PAGE_OFFSET, page_id);
    }

    pub fn parent_page_id(&self) -> Option<PageId> {
        read_optional_page_id(self.data, PARENT_PAGE_OFFSET)
    }

    pub fn set_parent_page_id(&mut self, page_id: Option<PageId>) {
        write_optional_page_id(self.data, PARENT_PAGE_OFFSET, page_id);
    }

    fn leaf_entry_offset(index: usize) -> usize {
        HEADER_SIZE + index * LEAF_ENTRY_SIZE
    }

    fn internal_entry_offset(index: usize) -> usize {
        HEADER_SIZE + index * INTERNAL_ENTRY_SIZE
    }

    pub fn get_key(&self, index: usize) -> Key {
        let offset = Self::leaf_entry_offset(index);
        let bytes: [u8; 4] = self.data[offset..offset + 4].try_into().unwrap();
        u32::from_le_bytes(bytes)
    }

    pub fn get_value(&self, index: usize) -> RecordId {
        let offset = Self::leaf_entry_offset(index) + KEY_SIZE;
        read_record_id(self.data, offset)
    }

    /// Binary search for `key` among leaf entries. Returns the index of
    /// `key` if present, otherwise the insertion point.
    pub fn search_key(&self, key: Key) -> usize {
        let num_keys = self.num_keys() as usize;
        let mut left = 0;
        let mut right = num_keys;

        while left < right {
            let mid = left + (right - left) / 2;
            if self.get_key(mid) < key {
                left = mid + 1;
            } else {
                right = mid;
            }
        }

        left
    }

    pub fn leaf_pairs(&self) -> Vec<KeyValuePair> {
        (0..self.num_keys() as usize)
            .map(|i| KeyValuePair {
                key: self.get_key(i),
                value: self.get_value(i),
            })
            .collect()
    }

    /// Overwrites this node's entries with `pairs`, which must already be
    /// sorted by key.
    pub fn set_leaf_pairs(&mut self, pairs: &[KeyValuePair]) {
        self.set_num_keys(pairs.len() as u16);
        for (i, pair) in pairs.iter().enumerate() {
            let offset = Self::leaf_entry_offset(i);
            self.data[offset..offset + 4].copy_from_slice(&pair.key.to_le_bytes());
            write_record_id(self.data, offset + KEY_SIZE, pair.value);
        }
    }

    /// Splits a full leaf in half, keeping the lower half and returning the
    /// separator key (the first key of the upper half) and the upper half.
    pub fn split_leaf(&mut self) -> (Key, Vec<KeyValuePair>) {
        let pairs = self.leaf_pairs();
        let mid = pairs.len() / 2;
        let right = pairs[mid..].to_vec();
        let separator = right[0].key;

        self.set_leaf_pairs(&pairs[..mid]);
        (separator, right)
    }

    // --- internal node accessors ---

    pub fn get_entry_key(&self, index: usize) -> Key {
        let offset = Self::internal_entry_offset(index);
        let bytes: [u8; 4] = self.data[offset..offset + 4].try_into().unwrap();
        u32::from_le_bytes(bytes)
    }

    pub fn get_child(&self, index: usize) -> PageId {
        let offset = Self::internal_entry_offset(index) + KEY_SIZE;
        let bytes: [u8; 4] = self.data[offset..offset + 4].try_into().unwrap();
        PageId::new(u32::from_le_bytes(bytes))
    }

    /// Finds which child subtree `key` belongs to: the largest index `i`
    /// such that `entry[i].key <= key` (entry 0's key is always treated as
    /// the minimum).
    pub fn find_child_index(&self, key: Key) -> usize {
        let num_entries = self.num_keys() as usize;
        let mut left = 1;
        let mut right = num_entries;

        while left < right {
            let mid = left + (right - left) / 2;
            if self.get_entry_key(mid) <= key {
                left = mid + 1;
            } else {
                right = mid;
            }
        }

        left - 1
    }

    /// Locates the slot index of `child_id` among this node's children.
    pub fn index_of_child(&self, child_id: PageId) -> Option<usize> {
        (0..self.num_keys() as usize).find(|&i| self.get_child(i) == child_id)
    }

    pub fn internal_entries(&self) -> Vec<InternalEntry> {
        (0..self.num_keys() as usize)
            .map(|i| InternalEntry {
                key: self.get_entry_key(i),
                child: self.get_child(i),
            })
            .collect()
    }

    /// Overwrites this node's entries with `entries`. `entries[0].key` is
    /// never read back and may be any value.
    pub fn set_internal_entries(&mut self, entries: &[InternalEntry]) {
        self.set_num_keys(entries.len() as u16);
        for (i, entry) in entries.iter().enumerate() {
            let offset = Self::internal_entry_offset(i);
            self.data[offset..offset + 4].copy_from_slice(&entry.key.to_le_bytes());
            self.data[offset + KEY_SIZE..offset + KEY_SIZE + 4]
                .copy_from_slice(&entry.child.as_u32().to_le_bytes());
        }
    }

    /// Splits a full internal node in half. The separator pushed up to the
    /// parent is the key that headed the upper half before the split; the
    /// upper half's own index-0 key becomes a placeholder.
    pub fn split_internal(&mut self) -> (Key, Vec<InternalEntry>) {
        let entries = self.internal_entries();
        let mid = entries.len() / 2;
        let separator = entries[mid].key;

        let mut right = entries[mid..].to_vec();
        right[0].key = 0;

        self.set_internal_entries(&entries[..mid]);
        (separator, right)
    }
}

fn read_optional_page_id(data: &[u8], offset: usize) -> Option<PageId> {
    let bytes: [u8; 4] = data[offset..offset + 4].try_into().unwrap();
    let value = u32::from_le_bytes(bytes);
    if value == INVALID_PAGE {
        None
    } else {
        Some(PageId::new(value))
    }
}

fn write_optional_page_id(data: &mut [u8], offset: usize, page_id: Option<PageId>) {
    let value = page_id.map(|p| p.as_u32()).unwrap_or(INVALID_PAGE);
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn read_record_id(data: &[u8], offset: usize) -> RecordId {
    let page_id_bytes: [u8; 4] = data[offset..offset + 4].try_into().unwrap();
    let slot_id_bytes: [u8; 2] = data[offset + 4..offset + 6].try_into().unwrap();
    RecordId::new(
        PageId::new(u32::from_le_bytes(page_id_bytes)),
        SlotId::new(u16::from_le_bytes(slot_id_bytes)),
    )
}

fn write_record_id(data: &mut [u8], offset: usize, value: RecordId) {
    data[offset..offset + 4].copy_from_slice(&value.page_id.as_u32().to_le_bytes());
    data[offset + 4..offset + 6].copy_from_slice(&value.slot_id.as_u16().to_le_bytes());
}

/// Read-only view over a B+ tree node page, mirroring [`BTreeNode`]'s
/// accessors for code paths that only need to inspect a page.
pub struct BTreeNodeRef<'a> {
    data: &'a [u8],
}

impl<'a> BTreeNodeRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn page_id(&self) -> PageId {
        let bytes: [u8; 4] = self.data[PAGE_ID_OFFSET..PAGE_ID_OFFSET + 4]
            .try_into()
            .unwrap();
        PageId::new(u32::from_le_bytes(bytes))
    }

    pub fn is_leaf(&self) -> bool {
        self.data[IS_LEAF_OFFSET] == 1
    }

    pub fn num_keys(&self) -> u16 {
        let bytes: [u8; 2] = self.data[NUM_KEYS_OFFSET..NUM_KEYS_OFFSET + 2]
            .try_into()
            .unwrap();
        u16::from_le_bytes(bytes)
    }

    pub fn next_page_id(&self) -> Option<PageId> {
        read_optional_page_id(self.data, NEXT_PAGE_OFFSET)
    }

    pub fn parent_page_id(&self) -> Option<PageId> {
        read_optional_page_id(self.data, PARENT_PAGE_OFFSET)
    }

    pub fn get_key(&self, index: usize) -> Key {
        let offset = BTreeNode::leaf_entry_offset(index);
        let bytes: [u8; 4] = self.data[offset..offset + 4].try_into().unwrap();
        u32::from_le_bytes(bytes)
    }

    pub fn get_value(&self, index: usize) -> RecordId {
        let offset = BTreeNode::leaf_entry_offset(index) + KEY_SIZE;
        read_record_id(self.data, offset)
    }

    pub fn get_entry_key(&self, index: usize) -> Key {
        let offset = BTreeNode::internal_entry_offset(index);
        let bytes: [u8; 4] = self.data[offset..offset + 4].try_into().unwrap();
        u32::from_le_bytes(bytes)
    }

    pub fn get_child(&self, index: usize) -> PageId {
        let offset = BTreeNode::internal_entry_offset(index) + KEY_SIZE;
        let bytes: [u8; 4] = self.data[offset..offset + 4].try_into().unwrap();
        PageId::new(u32::from_le_bytes(bytes))
    }

    pub fn search_key(&self, key: Key) -> usize {
        let num_keys = self.num_keys() as usize;
        let mut left = 0;
        let mut right = num_keys;

        while left < right {
            let mid = left + (right - left) / 2;
            if self.get_key(mid) < key {
                left = mid + 1;
            } else {
                right = mid;
            }
        }

        left
    }

    pub fn find_child_index(&self, key: Key) -> usize {
        let num_entries = self.num_keys() as usize;
        let mut left = 1;
        let mut right = num_entries;

        while left < right {
            let mid = left + (right - left) / 2;
            if self.get_entry_key(mid) <= key {
                left = mid + 1;
            } else {
                right = mid;
            }
        }

        left - 1
    }

    pub fn leaf_pairs(&self) -> Vec<KeyValuePair> {
        (0..self.num_keys() as usize)
            .map(|i| KeyValuePair {
                key: self.get_key(i),
                value: self.get_value(i),
            })
            .collect()
    }

    pub fn internal_entries(&self) -> Vec<InternalEntry> {
        (0..self.num_keys() as usize)
            .map(|i| InternalEntry {
                key: self.get_entry_key(i),
                child: self.get_child(i),
            })
            .collect()
    }

    pub fn index_of_child(&self, child_id: PageId) -> Option<usize> {
        (0..self.num_keys() as usize).find(|&i| self.get_child(i) == child_id)
    }
}
