//! Request extractors for dispatch headers and listing queries.

pub mod dispatch;
pub mod query;
