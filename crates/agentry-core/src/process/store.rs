//! Process persistence over symbolic memory.
//!
//! Two collections are used:
//! - `process_transitions`: the append-only log, one document per committed
//!   transition. The current state of a process is its newest entry.
//! - `processes`: one head document per process, upserted after every
//!   transition, used for listings.
//!
//! The two writes are independent. A listing may briefly show an older head
//! than a status read of the log.

use std::sync::Arc;

use agentry_types::error::RepositoryError;
use agentry_types::memory::{Document, FindOptions, ID_FIELD, SortSpec};
use agentry_types::paging::{Page, PageRequest};
use agentry_types::process::{ProcessId, ProcessSummary, ProcessTransition, format_timestamp};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::memory::AgentMemory;
use crate::paging::query_page;

/// Collection holding every committed transition.
pub const TRANSITIONS: &str = "process_transitions";
/// Collection holding one head document per process.
pub const PROCESSES: &str = "processes";
/// Sort key for listings and latest-wins reads.
pub const SORT_KEY: &str = "updated_at";

/// Reads and writes process transitions.
#[derive(Clone)]
pub struct ProcessStore {
    memory: Arc<AgentMemory>,
}

impl ProcessStore {
    pub fn new(memory: Arc<AgentMemory>) -> Self {
        Self { memory }
    }

    /// The newest transition of `process_id`, if it exists and belongs to `agent`.
    pub async fn latest(
        &self,
        agent: &str,
        process_id: ProcessId,
    ) -> Result<Option<ProcessTransition>, RepositoryError> {
        let options = FindOptions::sorted(SortSpec::descending(SORT_KEY)).limit(1);
        let docs = self
            .memory
            .symbolic()
            .find(TRANSITIONS, &process_query(process_id), &options)
            .await?;
        match docs.into_iter().next() {
            Some(doc) => {
                let transition = transition_from_doc(&doc)?;
                Ok((transition.agent == agent).then_some(transition))
            }
            None => Ok(None),
        }
    }

    /// Every transition of `process_id`, oldest first.
    pub async fn history(
        &self,
        agent: &str,
        process_id: ProcessId,
    ) -> Result<Vec<ProcessTransition>, RepositoryError> {
        let mut query = process_query(process_id);
        query.insert("agent".to_string(), Value::String(agent.to_string()));
        let options = FindOptions::sorted(SortSpec::ascending(SORT_KEY));
        self.memory
            .symbolic()
            .find(TRANSITIONS, &query, &options)
            .await?
            .iter()
            .map(transition_from_doc)
            .collect()
    }

    /// Append a transition and refresh the process head.
    ///
    /// `previous` is the transition this one follows, or `None` for the first
    /// transition of a new process. `updated_at` is forced strictly past
    /// `previous.updated_at`.
    pub async fn commit(
        &self,
        previous: Option<&ProcessTransition>,
        process_id: ProcessId,
        agent: &str,
        state: &str,
        data: Value,
    ) -> Result<ProcessTransition, RepositoryError> {
        let now = Utc::now().trunc_subsecs(6);
        let (created_at, updated_at) = match previous {
            Some(prev) => (
                prev.created_at,
                now.max(prev.updated_at + Duration::microseconds(1)),
            ),
            None => (now, now),
        };
        let transition = ProcessTransition {
            process_id,
            agent: agent.to_string(),
            state: state.to_string(),
            data,
            created_at,
            updated_at,
        };

        let symbolic = self.memory.symbolic();
        symbolic
            .insert_one(TRANSITIONS, transition_to_doc(&transition))
            .await?;
        symbolic
            .upsert_one(PROCESSES, &head_query(process_id), &head_patch(&transition))
            .await?;

        tracing::debug!(
            process_id = %process_id,
            agent,
            state,
            updated_at = %format_timestamp(&updated_at),
            "committed transition"
        );
        Ok(transition)
    }

    /// One page of an agent's processes, ordered by last update.
    pub async fn page(
        &self,
        agent: &str,
        request: &PageRequest,
    ) -> Result<Page<ProcessSummary>, RepositoryError> {
        let filter = to_document(json!({ "agent": agent }));
        let page = query_page(self.memory.symbolic(), PROCESSES, &filter, request, SORT_KEY).await?;
        let items = page
            .items
            .iter()
            .map(summary_from_head)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page {
            items,
            total_count: page.total_count,
            has_next: page.has_next,
        })
    }
}

// ---------------------------------------------------------------------------
// Document mapping
// ---------------------------------------------------------------------------

fn to_document(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

fn process_query(process_id: ProcessId) -> Document {
    to_document(json!({ "process_id": process_id.to_string() }))
}

fn head_query(process_id: ProcessId) -> Document {
    let mut query = Document::new();
    query.insert(ID_FIELD.to_string(), Value::String(process_id.to_string()));
    query
}

fn transition_to_doc(t: &ProcessTransition) -> Document {
    let mut doc = to_document(json!({
        "process_id": t.process_id.to_string(),
        "agent": t.agent,
        "state": t.state,
        "data": t.data,
        "created_at": format_timestamp(&t.created_at),
        "updated_at": format_timestamp(&t.updated_at),
    }));
    doc.insert(ID_FIELD.to_string(), Value::String(Uuid::now_v7().to_string()));
    doc
}

fn head_patch(t: &ProcessTransition) -> Document {
    to_document(json!({
        "process_id": t.process_id.to_string(),
        "agent": t.agent,
        "state": t.state,
        "created_at": format_timestamp(&t.created_at),
        "updated_at": format_timestamp(&t.updated_at),
    }))
}

fn str_field<'a>(doc: &'a Document, field: &str) -> Result<&'a str, RepositoryError> {
    doc.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| RepositoryError::Query(format!("process document missing '{field}'")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn parse_process_id(s: &str) -> Result<ProcessId, RepositoryError> {
    s.parse()
        .map_err(|e| RepositoryError::Query(format!("invalid process_id: {e}")))
}

fn transition_from_doc(doc: &Document) -> Result<ProcessTransition, RepositoryError> {
    Ok(ProcessTransition {
        process_id: parse_process_id(str_field(doc, "process_id")?)?,
        agent: str_field(doc, "agent")?.to_string(),
        state: str_field(doc, "state")?.to_string(),
        data: doc.get("data").cloned().unwrap_or(Value::Null),
        created_at: parse_datetime(str_field(doc, "created_at")?)?,
        updated_at: parse_datetime(str_field(doc, "updated_at")?)?,
    })
}

fn summary_from_head(doc: &Document) -> Result<ProcessSummary, RepositoryError> {
    Ok(ProcessSummary {
        process_id: parse_process_id(str_field(doc, "process_id")?)?,
        state: str_field(doc, "state")?.to_string(),
        updated_at: parse_datetime(str_field(doc, "updated_at")?)?,
    })
}
