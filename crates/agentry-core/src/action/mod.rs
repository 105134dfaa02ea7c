//! Actions: the named, state-gated capabilities an agent exposes.

pub mod context;
pub mod descriptor;
pub mod handler;
pub mod registry;

pub use context::ActionContext;
pub use descriptor::{ActionDescriptor, SchemaBuilder, schema_of};
pub use handler::{ActionHandler, ActionOutcome, BoxActionHandler, handler_fn, parse_input};
pub use registry::ActionRegistry;
