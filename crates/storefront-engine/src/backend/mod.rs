//! Storage backends implementing every trait in [`crate::store`].
//!
//! - [`memory`]: process-local maps, used by tests and single-process demos
//! - [`sqlite`]: the storefront-db repositories

pub mod memory;
pub mod sqlite;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;
