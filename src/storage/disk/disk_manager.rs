use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use log::{debug, info};
use parking_lot::Mutex;

use crate::common::{CrioError, PageId, Result, HEADER_PAGE_ID, PAGE_SIZE};
use crate::storage::page::HeaderPage;

/// DiskManager is responsible for reading and writing fixed-size pages
/// to and from a single backing file. Page 0 is always the header page;
/// `allocate_page` never hands it out as a data page.
pub struct DiskManager {
    file: Mutex<File>,
    db_path: PathBuf,
    num_pages: AtomicU32,
    free_list: Mutex<Vec<PageId>>,
    num_reads: AtomicU32,
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Opens (or creates) the database file at `db_path`. A freshly created
    /// file is initialized with an empty header page at page 0.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        let is_new = !db_path.exists() || db_path.metadata().map(|m| m.len() == 0).unwrap_or(true);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&db_path)?;

        let file_size = file.metadata()?.len();
        let num_pages = (file_size / PAGE_SIZE as u64) as u32;

        let dm = Self {
            file: Mutex::new(file),
            db_path,
            num_pages: AtomicU32::new(num_pages.max(1)),
            free_list: Mutex::new(Vec::new()),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        };

        if is_new || num_pages == 0 {
            let mut data = [0u8; PAGE_SIZE];
            HeaderPage::new(&mut data).init();
            dm.write_page(HEADER_PAGE_ID, &data)?;
            dm.num_pages.store(1, Ordering::SeqCst);
            info!("initialized new database file at {}", dm.db_path.display());
        } else {
            let mut data = [0u8; PAGE_SIZE];
            dm.read_page(HEADER_PAGE_ID, &mut data)?;
            info!(
                "opened existing database file at {} ({} pages)",
                dm.db_path.display(),
                num_pages
            );
        }

        Ok(dm)
    }

    /// Reads a single page into `data`, which must be exactly `PAGE_SIZE` bytes.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "buffer must be PAGE_SIZE bytes");

        let byte_offset = (page_id.as_u32() as u64) * (PAGE_SIZE as u64);
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(byte_offset))?;

        let bytes_read = file.read(data)?;
        if bytes_read < PAGE_SIZE {
            data[bytes_read..].fill(0);
        }

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes a single page from `data`, which must be exactly `PAGE_SIZE` bytes.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "buffer must be PAGE_SIZE bytes");

        let byte_offset = (page_id.as_u32() as u64) * (PAGE_SIZE as u64);
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(byte_offset))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Reads `num_pages` contiguous pages starting at `start_page_id` in a
    /// single I/O operation.
    pub fn read_pages(&self, start_page_id: PageId, num_pages: u32, data: &mut [u8]) -> Result<()> {
        let expected_size = num_pages as usize * PAGE_SIZE;
        assert_eq!(data.len(), expected_size);

        let byte_offset = (start_page_id.as_u32() as u64) * (PAGE_SIZE as u64);
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(byte_offset))?;

        let bytes_read = file.read(data)?;
        if bytes_read < expected_size {
            data[bytes_read..].fill(0);
        }

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes `num_pages` contiguous pages starting at `start_page_id` in a
    /// single I/O operation.
    pub fn write_pages(&self, start_page_id: PageId, num_pages: u32, data: &[u8]) -> Result<()> {
        let expected_size = num_pages as usize * PAGE_SIZE;
        assert_eq!(data.len(), expected_size);

        let byte_offset = (start_page_id.as_u32() as u64) * (PAGE_SIZE as u64);
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(byte_offset))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Allocates a new page, reusing a freed id if one is available, and
    /// zero-initializes it on disk. Never returns the header page id.
    pub fn allocate_page(&self) -> Result<PageId> {
        if let Some(page_id) = self.free_list.lock().pop() {
            let zeros = [0u8; PAGE_SIZE];
            self.write_page(page_id, &zeros)?;
            debug!("allocated page {} from free list", page_id);
            return Ok(page_id);
        }

        let raw = self.num_pages.fetch_add(1, Ordering::SeqCst);
        let page_id = PageId::new(raw);

        let zeros = [0u8; PAGE_SIZE];
        self.write_page(page_id, &zeros)?;
        debug!("allocated new page {}", page_id);

        Ok(page_id)
    }

    /// Returns `page_id`'s slot to the free list for reuse by a later
    /// `allocate_page`. The id remains valid in the file but is not
    /// re-read until reallocated.
    pub fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        if page_id != HEADER_PAGE_ID {
            self.free_list.lock().push(page_id);
            debug!("deallocated page {}", page_id);
        }
        Ok(())
    }

    pub fn get_num_pages(&self) -> u32 {
        self.num_pages.load(Ordering::Relaxed)
    }

    pub fn get_num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn get_num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_all().map_err(CrioError::from)
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let _ = self.file.get_mut().sync_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_manager_new_initializes_header_page() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let dm = DiskManager::new(&db_path).unwrap();
        assert!(db_path.exists());
        assert_eq!(dm.get_num_pages(), 1);
    }

    #[test]
    fn test_disk_manager_allocate_page_skips_header() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("alloc.db");
        let dm = DiskManager::new(&db_path).unwrap();

        let page_id = dm.allocate_page().unwrap();
        assert_ne!(page_id, HEADER_PAGE_ID);
        assert_eq!(page_id, PageId::new(1));
    }

    #[test]
    fn test_disk_manager_read_write() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("rw.db");
        let dm = DiskManager::new(&db_path).unwrap();

        let page_id = dm.allocate_page().unwrap();

        let mut write_data = [0u8; PAGE_SIZE];
        write_data[0] = 42;
        write_data[100] = 255;
        write_data[PAGE_SIZE - 1] = 128;
        dm.write_page(page_id, &write_data).unwrap();

        let mut read_data = [0u8; PAGE_SIZE];
        dm.read_page(page_id, &mut read_data).unwrap();

        assert_eq!(read_data[0], 42);
        assert_eq!(read_data[100], 255);
        assert_eq!(read_data[PAGE_SIZE - 1], 128);
    }

    #[test]
    fn test_disk_manager_deallocate_reuses_id() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("reuse.db");
        let dm = DiskManager::new(&db_path).unwrap();

        let page_id = dm.allocate_page().unwrap();
        dm.deallocate_page(page_id).unwrap();
        let reused = dm.allocate_page().unwrap();

        assert_eq!(reused, page_id);
    }

    #[test]
    fn test_disk_manager_persistence() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("persist.db");

        {
            let dm = DiskManager::new(&db_path).unwrap();
            let page_id = dm.allocate_page().unwrap();
            let mut data = [0u8; PAGE_SIZE];
            data[0] = 123;
            dm.write_page(page_id, &data).unwrap();
        }

        {
            let dm = DiskManager::new(&db_path).unwrap();
            assert_eq!(dm.get_num_pages(), 2);

            let mut data = [0u8; PAGE_SIZE];
            dm.read_page(PageId::new(1), &mut data).unwrap();
            assert_eq!(data[0], 123);
        }
    }

    #[test]
    fn test_disk_manager_bulk_read_write() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("bulk.db");
        let dm = DiskManager::new(&db_path).unwrap();

        let p1 = dm.allocate_page().unwrap();
        let p2 = dm.allocate_page().unwrap();
        assert_eq!(p2.as_u32(), p1.as_u32() + 1);

        let mut bulk = vec![0u8; 2 * PAGE_SIZE];
        bulk[0] = 1;
        bulk[PAGE_SIZE] = 2;
        dm.write_pages(p1, 2, &bulk).unwrap();

        let mut read_back = vec![0u8; 2 * PAGE_SIZE];
        dm.read_pages(p1, 2, &mut read_back).unwrap();
        assert_eq!(read_back[0], 1);
        assert_eq!(read_back[PAGE_SIZE], 2);
    }
}
