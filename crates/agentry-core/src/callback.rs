//! Completion callback port.
//!
//! After a dispatch commits its final transition, the orchestrator hands the
//! snapshot to a [`CallbackNotifier`] if the caller supplied a callback url.
//! Delivery is best-effort: failures are logged and reported as events, and
//! never touch the committed transition.

use std::future::Future;
use std::pin::Pin;

use agentry_types::error::CallbackError;
use agentry_types::process::ProcessSnapshot;

/// Trait for delivering a final snapshot to a caller-supplied url.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
/// The HTTP implementation lives in agentry-infra.
pub trait CallbackNotifier: Send + Sync {
    fn notify(
        &self,
        url: &str,
        snapshot: &ProcessSnapshot,
    ) -> impl Future<Output = Result<(), CallbackError>> + Send;
}

/// Notifier that drops every callback. Used when no delivery channel is wired.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl CallbackNotifier for NoopNotifier {
    async fn notify(&self, url: &str, snapshot: &ProcessSnapshot) -> Result<(), CallbackError> {
        tracing::debug!(
            process_id = %snapshot.process_id,
            url,
            "callback delivery not configured, dropping"
        );
        Ok(())
    }
}

/// Object-safe version of [`CallbackNotifier`] with boxed futures.
pub trait CallbackNotifierDyn: Send + Sync {
    fn notify_boxed<'a>(
        &'a self,
        url: &'a str,
        snapshot: &'a ProcessSnapshot,
    ) -> Pin<Box<dyn Future<Output = Result<(), CallbackError>> + Send + 'a>>;
}

impl<T: CallbackNotifier> CallbackNotifierDyn for T {
    fn notify_boxed<'a>(
        &'a self,
        url: &'a str,
        snapshot: &'a ProcessSnapshot,
    ) -> Pin<Box<dyn Future<Output = Result<(), CallbackError>> + Send + 'a>> {
        Box::pin(self.notify(url, snapshot))
    }
}

/// Type-erased callback notifier.
pub struct BoxCallbackNotifier {
    inner: Box<dyn CallbackNotifierDyn + Send + Sync>,
}

impl BoxCallbackNotifier {
    pub fn new<T: CallbackNotifier + 'static>(notifier: T) -> Self {
        Self {
            inner: Box::new(notifier),
        }
    }

    pub async fn notify(&self, url: &str, snapshot: &ProcessSnapshot) -> Result<(), CallbackError> {
        self.inner.notify_boxed(url, snapshot).await
    }
}

impl Default for BoxCallbackNotifier {
    fn default() -> Self {
        Self::new(NoopNotifier)
    }
}
