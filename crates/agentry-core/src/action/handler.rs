//! Action handler trait, its type-erased wrapper, and the closure adapter.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use agentry_types::error::ActionError;
use agentry_types::process::TERMINATED;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::context::ActionContext;

/// What a handler asks the orchestrator to commit next.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub state: String,
    pub data: Value,
}

impl ActionOutcome {
    /// Move the process to `state`, which later actions can resume from.
    pub fn next(state: impl Into<String>, data: Value) -> Self {
        Self {
            state: state.into(),
            data,
        }
    }

    /// End the process.
    pub fn terminated(data: Value) -> Self {
        Self {
            state: TERMINATED.to_string(),
            data,
        }
    }
}

/// Trait for the code behind an action.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition). Dependencies
/// arrive through [`ActionContext`]; handlers hold no ambient state.
pub trait ActionHandler: Send + Sync {
    fn handle(
        &self,
        ctx: ActionContext,
        input: Value,
    ) -> impl Future<Output = Result<ActionOutcome, ActionError>> + Send;
}

/// Object-safe version of [`ActionHandler`] with boxed futures.
pub trait ActionHandlerDyn: Send + Sync {
    fn handle_boxed(
        &self,
        ctx: ActionContext,
        input: Value,
    ) -> Pin<Box<dyn Future<Output = Result<ActionOutcome, ActionError>> + Send + '_>>;
}

impl<T: ActionHandler> ActionHandlerDyn for T {
    fn handle_boxed(
        &self,
        ctx: ActionContext,
        input: Value,
    ) -> Pin<Box<dyn Future<Output = Result<ActionOutcome, ActionError>> + Send + '_>> {
        Box::pin(self.handle(ctx, input))
    }
}

/// Type-erased, cheaply cloneable action handler.
#[derive(Clone)]
pub struct BoxActionHandler {
    inner: Arc<dyn ActionHandlerDyn + Send + Sync>,
}

impl BoxActionHandler {
    pub fn new<T: ActionHandler + 'static>(handler: T) -> Self {
        Self {
            inner: Arc::new(handler),
        }
    }

    pub async fn handle(&self, ctx: ActionContext, input: Value) -> Result<ActionOutcome, ActionError> {
        self.inner.handle_boxed(ctx, input).await
    }
}

impl std::fmt::Debug for BoxActionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BoxActionHandler")
    }
}

/// Adapter turning an async closure into an [`ActionHandler`].
pub struct FnHandler<F>(F);

/// Wrap `f` so it can be registered as an action handler.
///
/// ```ignore
/// let handler = handler_fn(|_ctx, input| async move {
///     Ok(ActionOutcome::terminated(input))
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(ActionContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ActionOutcome, ActionError>> + Send + 'static,
{
    FnHandler(f)
}

impl<F, Fut> ActionHandler for FnHandler<F>
where
    F: Fn(ActionContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ActionOutcome, ActionError>> + Send + 'static,
{
    fn handle(
        &self,
        ctx: ActionContext,
        input: Value,
    ) -> impl Future<Output = Result<ActionOutcome, ActionError>> + Send {
        (self.0)(ctx, input)
    }
}

/// Deserialize a dispatch payload into the handler's input type.
///
/// A null payload is read as an empty object. Shape mismatches become a 422
/// user failure.
pub fn parse_input<T: DeserializeOwned>(input: Value) -> Result<T, ActionError> {
    let input = if input.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        input
    };
    serde_json::from_value(input).map_err(|e| ActionError::user(422, format!("invalid input: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Rename {
        title: String,
        #[serde(default)]
        pinned: bool,
    }

    #[test]
    fn parse_input_reads_typed_payload() {
        let parsed: Rename = parse_input(json!({"title": "draft"})).unwrap();
        assert_eq!(parsed.title, "draft");
        assert!(!parsed.pinned);
    }

    #[test]
    fn parse_input_mismatch_is_user_failure() {
        let err = parse_input::<Rename>(json!({"pinned": true})).unwrap_err();
        match err {
            ActionError::User { status_code, detail } => {
                assert_eq!(status_code, 422);
                assert!(detail.contains("title"));
            }
            other => panic!("expected user failure, got {other:?}"),
        }
    }

    #[test]
    fn parse_input_null_is_empty_object() {
        #[derive(Deserialize)]
        struct Empty {}
        assert!(parse_input::<Empty>(Value::Null).is_ok());
    }

    #[test]
    fn outcome_constructors() {
        let next = ActionOutcome::next("drafting", json!({"n": 1}));
        assert_eq!(next.state, "drafting");
        let done = ActionOutcome::terminated(json!(null));
        assert_eq!(done.state, "terminated");
    }
}
