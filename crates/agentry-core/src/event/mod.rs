//! Event bus for process lifecycle notifications.
//!
//! Provides an `EventBus` that distributes `ProcessEvent` messages to all
//! subscribers via a `tokio::sync::broadcast` channel, and `ProcessWatch`
//! for following a single process.

pub mod bus;

pub use bus::{EventBus, ProcessWatch};
