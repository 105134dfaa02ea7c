//! The `notebook` demo agent.
//!
//! A notebook is opened with a title, collects text entries while `open`, can
//! recall its most recent entries, and ends when closed. Entries are kept in
//! symbolic memory; when file memory is configured each entry is also written
//! as a markdown file under the process's file scope.

use agentry_core::action::{ActionContext, ActionDescriptor, ActionOutcome, handler_fn, parse_input, schema_of};
use agentry_types::error::{ActionError, RegistryError};
use agentry_types::memory::{Document, FindOptions, ID_FIELD, SortSpec};
use agentry_types::process::format_timestamp;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const AGENT: &str = "notebook";
pub const OPEN: &str = "open";

const NOTEBOOKS: &str = "notebooks";
const ENTRIES: &str = "notebook_entries";
const DEFAULT_RECALL: u64 = 5;

/// Input for `open`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct OpenNotebook {
    /// Title shown in listings and returned on every step.
    pub title: String,
}

/// Input for `append`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct AppendEntry {
    pub text: String,
}

/// Input for `recall`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RecallEntries {
    /// How many of the newest entries to return.
    #[serde(default)]
    pub limit: Option<u64>,
}

/// Snapshot data for an open or closed notebook.
#[derive(Debug, Serialize, JsonSchema)]
pub struct NotebookData {
    pub title: String,
    pub entries: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recent: Vec<String>,
}

fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

fn non_empty(field: &str, value: &str) -> Result<String, ActionError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ActionError::user(422, format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

fn notebook_key(ctx: &ActionContext) -> Document {
    let mut key = Document::new();
    key.insert(ID_FIELD.to_string(), json!(ctx.process_id.to_string()));
    key
}

async fn load_title(ctx: &ActionContext) -> Result<String, ActionError> {
    let record = ctx
        .memory
        .symbolic()
        .find_one(NOTEBOOKS, &notebook_key(ctx))
        .await?
        .ok_or_else(|| ActionError::unhandled(format!("notebook record missing for {}", ctx.process_id)))?;
    Ok(record
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string())
}

async fn entry_count(ctx: &ActionContext) -> Result<u64, ActionError> {
    let query = doc(json!({ "notebook": ctx.process_id.to_string() }));
    Ok(ctx.memory.symbolic().count(ENTRIES, &query).await?)
}

fn outcome(state: Option<&str>, data: NotebookData) -> Result<ActionOutcome, ActionError> {
    let data = serde_json::to_value(data)?;
    Ok(match state {
        Some(state) => ActionOutcome::next(state, data),
        None => ActionOutcome::terminated(data),
    })
}

async fn open(ctx: ActionContext, input: Value) -> Result<ActionOutcome, ActionError> {
    let input: OpenNotebook = parse_input(input)?;
    let title = non_empty("title", &input.title)?;

    let mut record = notebook_key(&ctx);
    record.insert("title".to_string(), json!(title));
    ctx.memory.symbolic().insert_one(NOTEBOOKS, record).await?;

    if let Some(files) = ctx.memory.file() {
        files
            .write_file(&ctx.file_scope(), "README.md", format!("# {title}\n").as_bytes())
            .await?;
    }

    tracing::debug!(process_id = %ctx.process_id, %title, "notebook opened");
    outcome(
        Some(OPEN),
        NotebookData {
            title,
            entries: 0,
            recent: Vec::new(),
        },
    )
}

async fn append(ctx: ActionContext, input: Value) -> Result<ActionOutcome, ActionError> {
    let input: AppendEntry = parse_input(input)?;
    let text = non_empty("text", &input.text)?;
    let title = load_title(&ctx).await?;
    let position = entry_count(&ctx).await?;

    let entry = doc(json!({
        "notebook": ctx.process_id.to_string(),
        "position": position,
        "text": text,
        "written_at": format_timestamp(&chrono::Utc::now()),
    }));
    ctx.memory.symbolic().insert_one(ENTRIES, entry).await?;

    if let Some(files) = ctx.memory.file() {
        let path = format!("entries/{position:04}.md");
        files.write_file(&ctx.file_scope(), &path, text.as_bytes()).await?;
    }

    outcome(
        Some(OPEN),
        NotebookData {
            title,
            entries: position + 1,
            recent: Vec::new(),
        },
    )
}

async fn recall(ctx: ActionContext, input: Value) -> Result<ActionOutcome, ActionError> {
    let input: RecallEntries = parse_input(input)?;
    let limit = input.limit.unwrap_or(DEFAULT_RECALL).max(1);
    let title = load_title(&ctx).await?;

    let query = doc(json!({ "notebook": ctx.process_id.to_string() }));
    let options = FindOptions::sorted(SortSpec::descending("position"))
        .limit(limit)
        .project(["text"]);
    let newest = ctx.memory.symbolic().find(ENTRIES, &query, &options).await?;
    let mut recent: Vec<String> = newest
        .iter()
        .filter_map(|d| d.get("text").and_then(Value::as_str).map(str::to_string))
        .collect();
    recent.reverse();

    outcome(
        Some(OPEN),
        NotebookData {
            title,
            entries: entry_count(&ctx).await?,
            recent,
        },
    )
}

async fn close(ctx: ActionContext, _input: Value) -> Result<ActionOutcome, ActionError> {
    let title = load_title(&ctx).await?;
    let entries = entry_count(&ctx).await?;
    ctx.memory
        .symbolic()
        .update_many(NOTEBOOKS, &notebook_key(&ctx), &doc(json!({ "closed": true })))
        .await?;
    outcome(
        None,
        NotebookData {
            title,
            entries,
            recent: Vec::new(),
        },
    )
}

/// The notebook's action table.
pub fn actions() -> Result<Vec<ActionDescriptor>, RegistryError> {
    Ok(vec![
        ActionDescriptor::builder("open", handler_fn(open))
            .initializer()
            .description("Open a new notebook")
            .input_schema(schema_of::<OpenNotebook>)
            .output_schema(schema_of::<NotebookData>)
            .build()?,
        ActionDescriptor::builder("append", handler_fn(append))
            .allowed_states([OPEN])
            .description("Append a text entry")
            .input_schema(schema_of::<AppendEntry>)
            .output_schema(schema_of::<NotebookData>)
            .build()?,
        ActionDescriptor::builder("recall", handler_fn(recall))
            .allowed_states([OPEN])
            .description("Return the newest entries, oldest first")
            .input_schema(schema_of::<RecallEntries>)
            .output_schema(schema_of::<NotebookData>)
            .build()?,
        ActionDescriptor::builder("close", handler_fn(close))
            .allowed_states([OPEN])
            .description("Close the notebook")
            .output_schema(schema_of::<NotebookData>)
            .build()?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use agentry_core::memory::{AgentMemory, BoxFileMemory, BoxSymbolicMemory, EphemeralSymbolicMemory};
    use agentry_core::process::ProcessOrchestrator;
    use agentry_infra::storage::LocalFileMemory;
    use agentry_types::error::DispatchError;
    use agentry_types::process::{DispatchOutcome, DispatchRequest, HTTP_ERROR, ProcessSnapshot, TERMINATED};
    use tempfile::TempDir;

    async fn orchestrator(tmp: &TempDir) -> ProcessOrchestrator {
        let memory = AgentMemory::new(BoxSymbolicMemory::new(EphemeralSymbolicMemory::new()))
            .with_file(BoxFileMemory::new(LocalFileMemory::new(tmp.path().join("files"))));
        let memory = Arc::new(memory);
        memory.start().await.unwrap();
        ProcessOrchestrator::builder(memory)
            .agent(AGENT, actions().unwrap())
            .unwrap()
            .build()
    }

    async fn run(orch: &ProcessOrchestrator, request: DispatchRequest) -> ProcessSnapshot {
        match orch.dispatch(request).await.unwrap() {
            DispatchOutcome::Completed(snapshot) => snapshot,
            other => panic!("expected a snapshot, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn notebook_lifecycle() {
        let tmp = TempDir::new().unwrap();
        let orch = orchestrator(&tmp).await;

        let opened = run(
            &orch,
            DispatchRequest::new(AGENT, "open").input(json!({"title": "  Field notes "})),
        )
        .await;
        assert_eq!(opened.state, OPEN);
        assert_eq!(opened.data["title"], json!("Field notes"));
        assert_eq!(opened.available_actions, vec!["append", "recall", "close"]);
        let pid = opened.process_id;

        for text in ["first", "second", "third"] {
            run(
                &orch,
                DispatchRequest::new(AGENT, "append").process(pid).input(json!({"text": text})),
            )
            .await;
        }

        let recalled = run(
            &orch,
            DispatchRequest::new(AGENT, "recall").process(pid).input(json!({"limit": 2})),
        )
        .await;
        assert_eq!(recalled.data["entries"], json!(3));
        assert_eq!(recalled.data["recent"], json!(["second", "third"]));

        let entry = tmp.path().join(format!("files/notebook/{pid}/entries/0001.md"));
        assert_eq!(std::fs::read_to_string(entry).unwrap(), "second");

        let closed = run(&orch, DispatchRequest::new(AGENT, "close").process(pid)).await;
        assert_eq!(closed.state, TERMINATED);
        assert_eq!(closed.data["entries"], json!(3));
        assert!(closed.available_actions.is_empty());

        let err = orch
            .dispatch(DispatchRequest::new(AGENT, "append").process(pid).input(json!({"text": "late"})))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Conflict { .. }));
    }

    #[tokio::test]
    async fn blank_title_is_a_user_failure() {
        let tmp = TempDir::new().unwrap();
        let orch = orchestrator(&tmp).await;
        let snapshot = run(&orch, DispatchRequest::new(AGENT, "open").input(json!({"title": " "}))).await;
        assert_eq!(snapshot.state, HTTP_ERROR);
        assert_eq!(
            snapshot.user_failure(),
            Some((422, "title must not be empty".to_string()))
        );
    }

    #[tokio::test]
    async fn missing_field_is_a_user_failure() {
        let tmp = TempDir::new().unwrap();
        let orch = orchestrator(&tmp).await;
        let snapshot = run(&orch, DispatchRequest::new(AGENT, "open").input(json!({}))).await;
        let (status, detail) = snapshot.user_failure().unwrap();
        assert_eq!(status, 422);
        assert!(detail.contains("title"));
    }

    #[test]
    fn schemas_describe_inputs() {
        let actions = actions().unwrap();
        let open = actions[0].summary();
        assert!(open.initializer);
        assert_eq!(open.input_schema["properties"]["title"]["type"], json!("string"));
        assert!(open.output_schema["properties"]["data"]["properties"]["entries"].is_object());
    }
}
