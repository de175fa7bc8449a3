//! Integration tests for the buffer pool manager

use std::sync::Arc;
use std::thread;

use crio::buffer::BufferPoolManager;
use crio::common::{CrioError, PageId};
use crio::storage::disk::DiskManager;
use tempfile::NamedTempFile;

fn create_bpm(pool_size: usize) -> (BufferPoolManager, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = BufferPoolManager::new(pool_size, 2, dm);
    (bpm, temp_file)
}

#[test]
fn test_buffer_pool_basic_operations() {
    let (bpm, _temp) = create_bpm(10);

    // Create a new page (page 0 is the header page, so the first data page is 1)
    let page_id = bpm.new_page().unwrap();
    assert_eq!(page_id, PageId::new(1));

    // Write data to the page
    {
        let mut guard = bpm.checked_write_page(page_id).unwrap().unwrap();
        guard.data_mut()[0] = 0xDE;
        guard.data_mut()[1] = 0xAD;
        guard.data_mut()[2] = 0xBE;
        guard.data_mut()[3] = 0xEF;
    }

    // Read data back
    {
        let guard = bpm.checked_read_page(page_id).unwrap().unwrap();
        assert_eq!(guard.data()[0], 0xDE);
        assert_eq!(guard.data()[1], 0xAD);
        assert_eq!(guard.data()[2], 0xBE);
        assert_eq!(guard.data()[3], 0xEF);
    }
}

#[test]
fn test_buffer_pool_persistence() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();

    let page_id;
    let test_data = b"Persistence test data";

    // Write data
    {
        let dm = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = BufferPoolManager::new(10, 2, dm);

        page_id = bpm.new_page().unwrap();

        {
            let mut guard = bpm.checked_write_page(page_id).unwrap().unwrap();
            guard.data_mut()[..test_data.len()].copy_from_slice(test_data);
        }

        bpm.flush_page(page_id).unwrap();
    }

    // Read data back with a new BPM
    {
        let dm = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = BufferPoolManager::new(10, 2, dm);

        let guard = bpm.checked_read_page(page_id).unwrap().unwrap();
        assert_eq!(&guard.data()[..test_data.len()], test_data);
    }
}

#[test]
fn test_buffer_pool_eviction() {
    let (bpm, _temp) = create_bpm(3);

    // Fill the buffer pool, unpinning each page as it's written
    let mut page_ids = Vec::new();
    for i in 0..3 {
        let pid = bpm.new_page().unwrap();
        {
            let mut guard = bpm.checked_write_page(pid).unwrap().unwrap();
            guard.data_mut()[0] = i as u8;
        }
        page_ids.push(pid);
    }

    // All pages should be unpinned now
    for &pid in &page_ids {
        assert_eq!(bpm.get_pin_count(pid), Some(0));
    }

    // Creating a new page should evict one of the three
    let new_pid = bpm.new_page().unwrap();
    assert_eq!(new_pid, PageId::new(4)); // pages 1,2,3 exist, new is 4

    // The evicted page's data should still be readable from disk
    for (i, &pid) in page_ids.iter().enumerate() {
        let guard = bpm.checked_read_page(pid).unwrap().unwrap();
        assert_eq!(guard.data()[0], i as u8);
    }
}

#[test]
fn test_buffer_pool_spec_scenario_pool3() {
    let (bpm, _temp) = create_bpm(3);

    // NewPage -> p1, p2, p3, each held pinned via a guard.
    let p1 = bpm.new_page().unwrap();
    let p2 = bpm.new_page().unwrap();
    let p3 = bpm.new_page().unwrap();

    let guard1 = bpm.checked_read_page(p1).unwrap().unwrap();
    let _guard2 = bpm.checked_read_page(p2).unwrap().unwrap();
    let _guard3 = bpm.checked_read_page(p3).unwrap().unwrap();

    // All three frames are pinned, so a fourth page has nowhere to go.
    assert!(matches!(bpm.new_page(), Err(CrioError::BufferPoolFull)));

    // Unpin p1 (not dirty) by dropping its guard.
    drop(guard1);

    // NewPage now succeeds, reusing p1's now-evictable frame for page 4.
    let p4 = bpm.new_page().unwrap();
    assert_eq!(p4, PageId::new(4));
}

#[test]
fn test_buffer_pool_pin_prevents_eviction() {
    let (bpm, _temp) = create_bpm(2);

    // Allocate two pages
    let pid1 = bpm.new_page().unwrap();
    let pid2 = bpm.new_page().unwrap();

    // Keep both pages pinned
    let _guard1 = bpm.checked_read_page(pid1).unwrap().unwrap();
    let _guard2 = bpm.checked_read_page(pid2).unwrap().unwrap();

    // Trying to create a new page should fail: no evictable frame exists
    let result = bpm.new_page();
    assert!(matches!(result, Err(CrioError::BufferPoolFull)));
}

#[test]
fn test_buffer_pool_delete_page() {
    let (bpm, _temp) = create_bpm(10);

    let pid = bpm.new_page().unwrap();

    // Write some data, then unpin so the page is cached but not pinned
    {
        let mut guard = bpm.checked_write_page(pid).unwrap().unwrap();
        guard.data_mut()[0] = 42;
    }

    // Delete the page
    assert!(bpm.delete_page(pid).unwrap());

    // The page should no longer be in the buffer pool
    assert_eq!(bpm.get_pin_count(pid), None);
}

#[test]
fn test_buffer_pool_delete_missing_page_is_noop() {
    let (bpm, _temp) = create_bpm(10);
    assert!(bpm.delete_page(PageId::new(999)).unwrap());
}

#[test]
fn test_buffer_pool_cannot_delete_pinned_page() {
    let (bpm, _temp) = create_bpm(10);

    let pid = bpm.new_page().unwrap();
    let _guard = bpm.checked_read_page(pid).unwrap().unwrap();

    // Cannot delete while pinned
    let result = bpm.delete_page(pid);
    assert!(matches!(result, Err(CrioError::PageStillPinned(_))));
}

#[test]
fn test_buffer_pool_flush_all() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();

    let page_ids;

    // Write data to multiple pages
    {
        let dm = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = BufferPoolManager::new(10, 2, dm);

        page_ids = (0..5)
            .map(|i| {
                let pid = bpm.new_page().unwrap();
                {
                    let mut guard = bpm.checked_write_page(pid).unwrap().unwrap();
                    guard.data_mut()[0] = i as u8;
                }
                pid
            })
            .collect::<Vec<_>>();

        bpm.flush_all_pages().unwrap();
    }

    // Read back with a fresh BPM
    {
        let dm = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = BufferPoolManager::new(10, 2, dm);

        for (i, &pid) in page_ids.iter().enumerate() {
            let guard = bpm.checked_read_page(pid).unwrap().unwrap();
            assert_eq!(guard.data()[0], i as u8);
        }
    }
}

#[test]
fn test_buffer_pool_concurrent_access() {
    let (bpm, _temp) = create_bpm(10);
    let bpm = Arc::new(bpm);

    // Create a page
    let page_id = bpm.new_page().unwrap();
    bpm.unpin_page(page_id, false).unwrap();

    // Spawn multiple reader threads
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let bpm = Arc::clone(&bpm);
            thread::spawn(move || {
                for _ in 0..100 {
                    let guard = bpm.checked_read_page(page_id).unwrap().unwrap();
                    let _ = guard.data()[0]; // Just read
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_buffer_pool_large_workload() {
    let (bpm, _temp) = create_bpm(5); // small pool to force evictions

    // Create many pages, unpinning each as it's written
    let page_ids: Vec<_> = (0..20)
        .map(|_| {
            let pid = bpm.new_page().unwrap();
            {
                let mut guard = bpm.checked_write_page(pid).unwrap().unwrap();
                let id_bytes = pid.as_u32().to_le_bytes();
                guard.data_mut()[..4].copy_from_slice(&id_bytes);
            }
            pid
        })
        .collect();

    // Read from each page and verify, even though most were evicted along the way
    for &pid in &page_ids {
        let guard = bpm.checked_read_page(pid).unwrap().unwrap();
        let id_bytes: [u8; 4] = guard.data()[..4].try_into().unwrap();
        assert_eq!(u32::from_le_bytes(id_bytes), pid.as_u32());
    }
}
