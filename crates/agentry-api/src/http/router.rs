//! Axum router configuration with middleware.
//!
//! All agent routes are under `/api/v1/`.
//! Middleware: CORS, tracing.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/agents", get(handlers::agent::list_agents))
        .route("/agents/{agent}/actions", get(handlers::agent::list_actions))
        .route(
            "/agents/{agent}/programs/{action}",
            post(handlers::process::start_process),
        )
        .route("/agents/{agent}/processes", get(handlers::process::list_processes))
        .route(
            "/agents/{agent}/processes/{process_id}/status",
            get(handlers::process::process_status),
        )
        .route(
            "/agents/{agent}/processes/{process_id}/actions/{action}",
            post(handlers::process::resume_process),
        );

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use agentry_types::config::{AgentryConfig, SimilarityBackend, SymbolicBackend};
    use axum::extract::State;
    use reqwest::StatusCode;
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    struct TestServer {
        base: String,
        client: reqwest::Client,
        state: AppState,
        _tmp: TempDir,
    }

    impl TestServer {
        async fn start() -> Self {
            let tmp = TempDir::new().unwrap();
            let mut config = AgentryConfig::default();
            config.memory.symbolic = SymbolicBackend::Ephemeral;
            config.memory.similarity = SimilarityBackend::None;
            config.callback.backoff_ms = 1;
            let state = AppState::from_config(config, tmp.path().to_path_buf())
                .await
                .unwrap();

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let router = build_router(state.clone());
            tokio::spawn(async move {
                axum::serve(listener, router).await.unwrap();
            });

            Self {
                base: format!("http://{addr}"),
                client: reqwest::Client::new(),
                state,
                _tmp: tmp,
            }
        }

        fn url(&self, path: &str) -> String {
            format!("{}{path}", self.base)
        }

        async fn get(&self, path: &str) -> (StatusCode, Value) {
            let resp = self.client.get(self.url(path)).send().await.unwrap();
            let status = resp.status();
            (status, resp.json().await.unwrap())
        }

        async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
            self.post_with(path, body, &[]).await
        }

        async fn post_with(&self, path: &str, body: Value, headers: &[(&str, &str)]) -> (StatusCode, Value) {
            let mut req = self.client.post(self.url(path)).json(&body);
            for (name, value) in headers {
                req = req.header(*name, *value);
            }
            let resp = req.send().await.unwrap();
            let status = resp.status();
            (status, resp.json().await.unwrap())
        }

        async fn open(&self, title: &str) -> String {
            let (status, body) = self
                .post("/api/v1/agents/notebook/programs/open", json!({ "title": title }))
                .await;
            assert_eq!(status, StatusCode::OK, "{body}");
            body["data"]["process_id"].as_str().unwrap().to_string()
        }

        /// Poll status until the process leaves `processing`.
        async fn settled(&self, process_id: &str) -> Value {
            let path = format!("/api/v1/agents/notebook/processes/{process_id}/status");
            for _ in 0..100 {
                let (status, body) = self.get(&path).await;
                if status == StatusCode::OK && body["data"]["state"] != json!("processing") {
                    return body;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            panic!("process {process_id} never settled");
        }
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let server = TestServer::start().await;
        let (status, body) = server.get("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn notebook_round_trip_over_http() {
        let server = TestServer::start().await;
        let pid = server.open("Trip log").await;

        let (status, body) = server
            .post(
                &format!("/api/v1/agents/notebook/processes/{pid}/actions/append"),
                json!({ "text": "left at dawn" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["state"], "open");
        assert_eq!(body["data"]["data"]["entries"], 1);
        assert_eq!(
            body["_links"]["self"],
            json!(format!("/api/v1/agents/notebook/processes/{pid}/status"))
        );

        let (status, body) = server
            .get(&format!("/api/v1/agents/notebook/processes/{pid}/status"))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["available_actions"], json!(["append", "recall", "close"]));

        let (status, body) = server
            .post(&format!("/api/v1/agents/notebook/processes/{pid}/actions/close"), Value::Null)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["state"], "terminated");

        let (status, body) = server
            .post(
                &format!("/api/v1/agents/notebook/processes/{pid}/actions/append"),
                json!({ "text": "too late" }),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["errors"][0]["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn user_failure_uses_recorded_status() {
        let server = TestServer::start().await;
        let (status, body) = server
            .post("/api/v1/agents/notebook/programs/open", json!({ "title": "" }))
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["data"]["detail"], "title must not be empty");
        assert_eq!(body["errors"][0]["code"], "ACTION_FAILED");
    }

    #[tokio::test]
    async fn request_errors_map_to_statuses() {
        let server = TestServer::start().await;

        let (status, _) = server.post("/api/v1/agents/ghost/programs/open", json!({})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = server
            .post("/api/v1/agents/notebook/processes/not-a-uuid/actions/append", json!({}))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = server
            .post("/api/v1/agents/notebook/programs/append", json!({ "text": "x" }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["code"], "INVALID_REQUEST");

        let (status, body) = server
            .post_with(
                "/api/v1/agents/notebook/programs/open",
                json!({ "title": "x" }),
                &[("execution-mode", "whenever")],
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["code"], "VALIDATION_ERROR");

        let resp = server
            .client
            .post(server.url("/api/v1/agents/notebook/programs/open"))
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn background_dispatch_is_acknowledged() {
        let server = TestServer::start().await;
        let (status, body) = server
            .post_with(
                "/api/v1/agents/notebook/programs/open",
                json!({ "title": "later" }),
                &[("execution-mode", "async")],
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["data"]["accepted"], true);
        let pid = body["data"]["process_id"].as_str().unwrap().to_string();
        assert!(body["_links"]["status"].as_str().unwrap().contains(&pid));

        let settled = server.settled(&pid).await;
        assert_eq!(settled["data"]["state"], "open");
        assert_eq!(settled["data"]["data"]["title"], "later");
    }

    #[tokio::test]
    async fn callback_receives_final_snapshot() {
        let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
        let hook = Router::new()
            .route(
                "/hook",
                post(
                    |State(tx): State<mpsc::UnboundedSender<Value>>, axum::Json(body): axum::Json<Value>| async move {
                        let _ = tx.send(body);
                    },
                ),
            )
            .with_state(tx);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let hook_url = format!("http://{}/hook", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, hook).await.unwrap();
        });

        let server = TestServer::start().await;
        let (status, body) = server
            .post_with(
                "/api/v1/agents/notebook/programs/open",
                json!({ "title": "hooked" }),
                &[("callback-url", hook_url.as_str())],
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let delivered = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivered["process_id"], body["data"]["process_id"]);
        assert_eq!(delivered["state"], "open");
    }

    #[tokio::test]
    async fn listing_pages_follow_next_links() {
        let server = TestServer::start().await;
        for title in ["a", "b", "c"] {
            server.open(title).await;
        }

        let (status, body) = server
            .get("/api/v1/agents/notebook/processes?limit=2&sort=descending")
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total"], 3);
        assert_eq!(body["data"]["processes"].as_array().unwrap().len(), 2);
        let next = body["data"]["next"].as_str().unwrap().to_string();
        assert_eq!(body["_links"]["next"], json!(next));
        assert!(next.contains("skip=2"));

        let (status, body) = server.get(&next).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["processes"].as_array().unwrap().len(), 1);
        assert!(body["data"]["next"].is_null());

        let (status, _) = server.get("/api/v1/agents/notebook/processes?sort=sideways").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn agents_and_actions_are_listed() {
        let server = TestServer::start().await;
        let (status, body) = server.get("/api/v1/agents").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["name"], "notebook");

        let (status, body) = server.get("/api/v1/agents/notebook/actions").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["name"], "open");
        assert_eq!(body["data"][0]["initializer"], true);
        assert_eq!(body["data"][0]["input_schema"]["properties"]["title"]["type"], "string");

        let (status, _) = server.get("/api/v1/agents/ghost/actions").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        server.state.shutdown().await.unwrap();
    }
}
