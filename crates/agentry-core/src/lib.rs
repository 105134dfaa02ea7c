//! Process orchestration and port definitions for Agentry.
//!
//! This crate owns the dispatch protocol, the action registry and the memory
//! ports that the infrastructure layer implements. It depends only on
//! `agentry-types`, never on `agentry-infra` or any database/IO crate.

pub mod action;
pub mod callback;
pub mod event;
pub mod execution;
pub mod memory;
pub mod paging;
pub mod process;
