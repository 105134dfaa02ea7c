//! HTTP delivery of completion callbacks.
//!
//! Implements `CallbackNotifier` from `agentry-core`: the final process
//! snapshot is POSTed as JSON to the caller's url. Transport errors, timeouts,
//! 5xx, 408 and 429 responses are retried with linear backoff; any other
//! non-success status gives up at once.

use std::time::Duration;

use agentry_core::callback::CallbackNotifier;
use agentry_types::config::CallbackConfig;
use agentry_types::error::CallbackError;
use agentry_types::process::ProcessSnapshot;
use reqwest::StatusCode;

/// `reqwest`-backed callback notifier.
#[derive(Clone)]
pub struct HttpCallbackNotifier {
    client: reqwest::Client,
    max_attempts: u32,
    backoff: Duration,
}

impl HttpCallbackNotifier {
    pub fn new(config: &CallbackConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            max_attempts: config.effective_attempts(),
            backoff: Duration::from_millis(config.backoff_ms),
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

fn retryable(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

impl CallbackNotifier for HttpCallbackNotifier {
    async fn notify(&self, url: &str, snapshot: &ProcessSnapshot) -> Result<(), CallbackError> {
        let target = reqwest::Url::parse(url).map_err(|e| CallbackError::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(target.scheme(), "http" | "https") {
            return Err(CallbackError::InvalidUrl(format!(
                "{url}: unsupported scheme '{}'",
                target.scheme()
            )));
        }

        let mut last_error = String::new();
        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.backoff * (attempt - 1)).await;
            }
            match self.client.post(target.clone()).json(snapshot).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(process_id = %snapshot.process_id, url, attempt, "callback accepted");
                    return Ok(());
                }
                Ok(response) => {
                    let status = response.status();
                    last_error = format!("callback endpoint answered {status}");
                    if !retryable(status) {
                        return Err(CallbackError::Delivery {
                            attempts: attempt,
                            message: last_error,
                        });
                    }
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }
            tracing::warn!(
                process_id = %snapshot.process_id,
                url,
                attempt,
                max_attempts = self.max_attempts,
                error = %last_error,
                "callback attempt failed"
            );
        }

        Err(CallbackError::Delivery {
            attempts: self.max_attempts,
            message: last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentry_types::process::ProcessId;
    use axum::Router;
    use axum::extract::State;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::post;
    use chrono::Utc;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Hits {
        bodies: Arc<Mutex<Vec<Value>>>,
    }

    /// Serve `statuses` in order, repeating the last one.
    async fn serve(statuses: Vec<u16>) -> (String, Hits) {
        let hits = Hits::default();
        let statuses = Arc::new(statuses);
        let app = Router::new()
            .route(
                "/hook",
                post(
                    |State((hits, statuses)): State<(Hits, Arc<Vec<u16>>)>,
                     axum::Json(body): axum::Json<Value>| async move {
                        let mut bodies = hits.bodies.lock().unwrap();
                        bodies.push(body);
                        let index = (bodies.len() - 1).min(statuses.len() - 1);
                        AxumStatus::from_u16(statuses[index]).unwrap()
                    },
                ),
            )
            .with_state((hits.clone(), statuses));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/hook"), hits)
    }

    fn notifier(max_attempts: u32) -> HttpCallbackNotifier {
        HttpCallbackNotifier::new(&CallbackConfig {
            timeout_secs: 5,
            max_attempts,
            backoff_ms: 1,
        })
        .unwrap()
    }

    fn snapshot() -> ProcessSnapshot {
        ProcessSnapshot {
            process_id: ProcessId::new(),
            agent: "notebook".to_string(),
            state: "open".to_string(),
            data: json!({ "pages": 1 }),
            available_actions: vec!["append".to_string()],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn delivers_snapshot_json() {
        let (url, hits) = serve(vec![200]).await;
        let snapshot = snapshot();
        notifier(3).notify(&url, &snapshot).await.unwrap();

        let bodies = hits.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["process_id"], json!(snapshot.process_id.to_string()));
        assert_eq!(bodies[0]["state"], json!("open"));
    }

    #[tokio::test]
    async fn retries_server_errors() {
        let (url, hits) = serve(vec![503, 200]).await;
        notifier(3).notify(&url, &snapshot()).await.unwrap();
        assert_eq!(hits.bodies.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let (url, hits) = serve(vec![500]).await;
        let err = notifier(3).notify(&url, &snapshot()).await.unwrap_err();
        assert!(matches!(err, CallbackError::Delivery { attempts: 3, .. }));
        assert_eq!(hits.bodies.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let (url, hits) = serve(vec![404]).await;
        let err = notifier(3).notify(&url, &snapshot()).await.unwrap_err();
        assert!(matches!(err, CallbackError::Delivery { attempts: 1, .. }));
        assert_eq!(hits.bodies.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn at_least_two_attempts() {
        let notifier = notifier(1);
        assert_eq!(notifier.max_attempts(), 2);
        let (url, hits) = serve(vec![500]).await;
        notifier.notify(&url, &snapshot()).await.unwrap_err();
        assert_eq!(hits.bodies.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn rejects_bad_urls() {
        let notifier = notifier(2);
        for url in ["not a url", "ftp://example.com/hook"] {
            let err = notifier.notify(url, &snapshot()).await.unwrap_err();
            assert!(matches!(err, CallbackError::InvalidUrl(_)));
        }
    }
}
