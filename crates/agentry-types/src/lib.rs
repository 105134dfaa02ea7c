//! Shared domain types for Agentry.
//!
//! This crate contains the types passed between the orchestrator, the memory
//! backends and the CLI/REST layer: processes and their transitions, paging,
//! memory documents, configuration, events, and the error enums.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod action;
pub mod config;
pub mod error;
pub mod event;
pub mod memory;
pub mod paging;
pub mod process;
