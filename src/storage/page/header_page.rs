use crate::common::PAGE_SIZE;

/// The header page is always allocated at page id 0. It persists a small
/// directory of `name -> root page id` records so that named indexes (and,
/// in a fuller system, tables) can be relocated after a restart without a
/// separate catalog.
///
/// Layout: a 4-byte little-endian record count, followed by fixed-size
/// 36-byte records (32-byte zero-padded name + 4-byte little-endian root
/// page id).
const RECORD_COUNT_OFFSET: usize = 0;
const RECORDS_OFFSET: usize = 4;
const NAME_SIZE: usize = 32;
const RECORD_SIZE: usize = NAME_SIZE + 4;
const MAX_RECORDS: usize = (PAGE_SIZE - RECORDS_OFFSET) / RECORD_SIZE;

fn encode_name(name: &str) -> [u8; NAME_SIZE] {
    assert!(name.len() < NAME_SIZE, "index name too long: {name}");
    let mut buf = [0u8; NAME_SIZE];
    buf[..name.len()].copy_from_slice(name.as_bytes());
    buf
}

/// Mutable view over a header page's bytes.
pub struct HeaderPage<'a> {
    data: &'a mut [u8],
}

impl<'a> HeaderPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn init(&mut self) {
        self.data.fill(0);
        self.set_record_count(0);
    }

    pub fn record_count(&self) -> u32 {
        let bytes: [u8; 4] = self.data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
            .try_into()
            .unwrap();
        u32::from_le_bytes(bytes)
    }

    fn set_record_count(&mut self, count: u32) {
        self.data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
            .copy_from_slice(&count.to_le_bytes());
    }

    fn record_offset(index: usize) -> usize {
        RECORDS_OFFSET + index * RECORD_SIZE
    }

    fn name_at(&self, index: usize) -> [u8; NAME_SIZE] {
        let offset = Self::record_offset(index);
        self.data[offset..offset + NAME_SIZE].try_into().unwrap()
    }

    fn root_id_at(&self, index: usize) -> u32 {
        let offset = Self::record_offset(index) + NAME_SIZE;
        let bytes: [u8; 4] = self.data[offset..offset + 4].try_into().unwrap();
        u32::from_le_bytes(bytes)
    }

    pub fn find_record(&self, name: &str) -> Option<usize> {
        let encoded = encode_name(name);
        let count = self.record_count() as usize;
        (0..count).find(|&i| self.name_at(i) == encoded)
    }

    /// Inserts a new `name -> root_id` record. Fails (returns `false`) if the
    /// name already has a record, or the page has no room left.
    pub fn insert_record(&mut self, name: &str, root_id: u32) -> bool {
        if self.find_record(name).is_some() {
            return false;
        }
        let count = self.record_count() as usize;
        if count >= MAX_RECORDS {
            return false;
        }

        let offset = Self::record_offset(count);
        let encoded = encode_name(name);
        self.data[offset..offset + NAME_SIZE].copy_from_slice(&encoded);
        self.data[offset + NAME_SIZE..offset + RECORD_SIZE]
            .copy_from_slice(&root_id.to_le_bytes());

        self.set_record_count((count + 1) as u32);
        true
    }

    /// Deletes the record for `name`, shifting later records down by one slot.
    pub fn delete_record(&mut self, name: &str) -> bool {
        let Some(index) = self.find_record(name) else {
            return false;
        };
        let count = self.record_count() as usize;

        let shift_start = Self::record_offset(index + 1);
        let shift_end = Self::record_offset(count);
        self.data.copy_within(shift_start..shift_end, Self::record_offset(index));

        self.set_record_count((count - 1) as u32);
        true
    }

    pub fn update_record(&mut self, name: &str, root_id: u32) -> bool {
        let Some(index) = self.find_record(name) else {
            return false;
        };
        let offset = Self::record_offset(index) + NAME_SIZE;
        self.data[offset..offset + 4].copy_from_slice(&root_id.to_le_bytes());
        true
    }

    pub fn get_root_id(&self, name: &str) -> Option<u32> {
        self.find_record(name).map(|i| self.root_id_at(i))
    }
}

/// Read-only view over a header page's bytes.
pub struct HeaderPageRef<'a> {
    data: &'a [u8],
}

impl<'a> HeaderPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn record_count(&self) -> u32 {
        let bytes: [u8; 4] = self.data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
            .try_into()
            .unwrap();
        u32::from_le_bytes(bytes)
    }

    fn name_at(&self, index: usize) -> [u8; NAME_SIZE] {
        let offset = RECORDS_OFFSET + index * RECORD_SIZE;
        self.data[offset..offset + NAME_SIZE].try_into().unwrap()
    }

    fn root_id_at(&self, index: usize) -> u32 {
        let offset = RECORDS_OFFSET + index * RECORD_SIZE + NAME_SIZE;
        let bytes: [u8; 4] = self.data[offset..offset + 4].try_into().unwrap();
        u32::from_le_bytes(bytes)
    }

    pub fn get_root_id(&self, name: &str) -> Option<u32> {
        let encoded = encode_name(name);
        let count = self.record_count() as usize;
        (0..count)
            .find(|&i| self.name_at(i) == encoded)
            .map(|i| self.root_id_at(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_page_insert_and_get() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = HeaderPage::new(&mut data);
        page.init();

        assert!(page.insert_record("ix", 7));
        assert_eq!(page.get_root_id("ix"), Some(7));
        assert_eq!(page.record_count(), 1);
    }

    #[test]
    fn test_header_page_duplicate_insert_fails() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = HeaderPage::new(&mut data);
        page.init();

        assert!(page.insert_record("ix", 7));
        assert!(!page.insert_record("ix", 11));
    }

    #[test]
    fn test_header_page_update() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = HeaderPage::new(&mut data);
        page.init();

        page.insert_record("ix", 7);
        assert!(page.update_record("ix", 11));
        assert_eq!(page.get_root_id("ix"), Some(11));

        assert!(!page.update_record("missing", 1));
    }

    #[test]
    fn test_header_page_insert_update_get_delete_sequence() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = HeaderPage::new(&mut data);
        page.init();

        assert!(page.insert_record("ix", 7));
        assert!(page.update_record("ix", 11));
        assert_eq!(page.get_root_id("ix"), Some(11));
        assert!(page.delete_record("ix"));
        assert_eq!(page.get_root_id("ix"), None);
    }

    #[test]
    fn test_header_page_delete() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = HeaderPage::new(&mut data);
        page.init();

        page.insert_record("a", 1);
        page.insert_record("b", 2);
        page.insert_record("c", 3);

        assert!(page.delete_record("b"));
        assert_eq!(page.record_count(), 2);
        assert_eq!(page.get_root_id("a"), Some(1));
        assert_eq!(page.get_root_id("b"), None);
        assert_eq!(page.get_root_id("c"), Some(3));
    }

    #[test]
    fn test_header_page_ref_matches_mut_view() {
        let mut data = [0u8; PAGE_SIZE];
        {
            let mut page = HeaderPage::new(&mut data);
            page.init();
            page.insert_record("ix", 42);
        }
        let page_ref = HeaderPageRef::new(&data);
        assert_eq!(page_ref.get_root_id("ix"), Some(42));
        assert_eq!(page_ref.record_count(), 1);
    }
}
