use std::sync::Arc;

use crio::buffer::BufferPoolManager;
use crio::index::BTreeIndex;
use crio::storage::disk::DiskManager;
use crio::{PageId, RecordId, SlotId};

fn main() {
    env_logger::init();

    println!("Crio - a disk-oriented storage and indexing core");
    println!("==================================================\n");

    let db_path = "demo.db";

    let disk_manager = Arc::new(DiskManager::new(db_path).expect("failed to open disk manager"));
    println!("Opened disk manager for: {}", db_path);

    let bpm = Arc::new(BufferPoolManager::new(32, 2, disk_manager));
    println!("Created buffer pool with 32 frames and LRU-2 replacement\n");

    let index = BTreeIndex::new(bpm.clone()).expect("failed to create index");
    println!("Created B+ tree index, root page {}", index.root_page_id());

    for key in [30u32, 10, 50, 20, 40] {
        let record = RecordId::new(PageId::new(key), SlotId::new(0));
        index.insert(key, record).expect("insert failed");
        println!("Inserted key={key}");
    }

    println!("\nAscending scan:");
    let mut iter = index.begin().expect("begin failed");
    while let Some((key, record)) = iter.next().expect("scan failed") {
        println!("  key={key} -> {:?}", record);
    }

    index.remove(20).expect("remove failed");
    println!(
        "\nRemoved key=20, value present: {}",
        index.get_value(20).unwrap().is_some()
    );

    bpm.flush_all_pages().expect("flush failed");
    println!("\nFlushed all pages to disk");

    std::fs::remove_file(db_path).ok();
    println!("Demo completed successfully!");
}
