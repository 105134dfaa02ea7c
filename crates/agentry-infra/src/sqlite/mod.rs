//! SQLite storage layer.
//!
//! Symbolic memory backed by SQLite with WAL mode and split read/write
//! connection pools.

pub mod pool;
pub mod symbolic;

pub use pool::DatabasePool;
pub use symbolic::SqliteSymbolicMemory;
