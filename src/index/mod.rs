pub mod btree_page;
pub mod btree_index;
pub mod btree_iterator;
pub mod key_comparator;

pub use btree_index::BTreeIndex;
pub use btree_iterator::BTreeIterator;
pub use btree_page::{BTreeNode, BTreeNodeRef, InternalEntry, KeyValuePair};
pub use key_comparator::{BytewiseComparator, IntegerComparator, Key, KeyComparator};
