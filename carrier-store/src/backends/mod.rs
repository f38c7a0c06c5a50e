//! Record store implementations
//!
//! - `memory`: In-memory storage with incrementally maintained indexes
//! - `file`: One bincode file per record in a directory
//! - `test`: Memory store wrapper with failure injection and call counters

pub mod file;
pub mod memory;

pub use file::FileRecordStore;
pub use memory::MemoryRecordStore;
pub use test::TestRecordStore;
