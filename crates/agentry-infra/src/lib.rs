//! Infrastructure layer for Agentry.
//!
//! Contains implementations of the ports defined in `agentry-core`: SQLite
//! symbolic memory, local file memory, in-process similarity search, HTTP
//! callback delivery, plus configuration loading.

pub mod callback;
pub mod config;
pub mod memory;
pub mod sqlite;
pub mod storage;
pub mod vector;
