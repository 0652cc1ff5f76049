//! Storage traits and implementations
//!
//! The sync jobs only talk to a [`DirectoryStore`]. The in-memory store backs
//! tests; the SQLite store is what the `dirsync` binary uses.

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryDirectoryStore;
pub use sqlite::SqliteDirectoryStore;
pub use traits::DirectoryStore;
