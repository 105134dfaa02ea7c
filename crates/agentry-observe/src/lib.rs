//! Observability setup for Agentry: structured logging via `tracing`, with
//! optional OpenTelemetry span export.

pub mod tracing_setup;

pub use tracing_setup::{TracingOptions, init_tracing, shutdown_tracing};
