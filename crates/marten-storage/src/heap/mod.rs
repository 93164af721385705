//! Heap relation storage: slotted pages and the append-only heap file.

pub mod file;
pub mod page;

pub use file::{HeapFile, HeapScan};
pub use page::{HeapPage, HeapPageHeader, RecordSlot};
