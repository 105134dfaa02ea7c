//! HTTP/REST API layer for Agentry.
//!
//! Axum-based REST API at `/api/v1/` with the envelope response format and
//! CORS support. Dispatches are routed to the process orchestrator.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod response;
pub mod router;
