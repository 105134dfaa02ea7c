//! Local filesystem storage.

pub mod file;

pub use file::LocalFileMemory;
