//! In-process symbolic memory.
//!
//! Holds every collection in a `DashMap` for the lifetime of the value. Used
//! by tests and by the `ephemeral` backend for throwaway deployments. Data
//! survives `stop`/`start` cycles but not the process.

use std::sync::atomic::{AtomicBool, Ordering};

use agentry_types::error::RepositoryError;
use agentry_types::memory::{Document, FindOptions, ID_FIELD, MemoryRecord};
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

use super::query::{document_from_query, matches, merge_patch, project, sort_documents};
use super::symbolic::SymbolicMemory;

/// DashMap-backed implementation of [`SymbolicMemory`].
#[derive(Default)]
pub struct EphemeralSymbolicMemory {
    collections: DashMap<String, Vec<MemoryRecord>>,
    started: AtomicBool,
}

impl EphemeralSymbolicMemory {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_started(&self) -> Result<(), RepositoryError> {
        if self.started.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(RepositoryError::NotStarted)
        }
    }

    /// Snapshot of the documents matching `query`, in `_id` order.
    fn matching(&self, collection: &str, query: &Document) -> Vec<Document> {
        let mut docs: Vec<Document> = self
            .collections
            .get(collection)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| matches(&r.fields, query))
                    .map(|r| r.fields.clone())
                    .collect()
            })
            .unwrap_or_default();
        docs.sort_by(|a, b| {
            let a = a.get(ID_FIELD).and_then(Value::as_str).unwrap_or_default();
            let b = b.get(ID_FIELD).and_then(Value::as_str).unwrap_or_default();
            a.cmp(b)
        });
        docs
    }
}

/// Take the document's `_id`, generating a UUIDv7 when absent.
pub fn assign_id(document: &mut Document) -> Result<String, RepositoryError> {
    match document.get(ID_FIELD) {
        Some(Value::String(id)) => Ok(id.clone()),
        Some(other) => Err(RepositoryError::Query(format!(
            "{ID_FIELD} must be a string, got {other}"
        ))),
        None => {
            let id = Uuid::now_v7().to_string();
            document.insert(ID_FIELD.to_string(), Value::String(id.clone()));
            Ok(id)
        }
    }
}

fn record(collection: &str, id: String, fields: Document) -> MemoryRecord {
    MemoryRecord {
        collection: collection.to_string(),
        id,
        fields,
        timestamp: Utc::now(),
    }
}

impl SymbolicMemory for EphemeralSymbolicMemory {
    async fn start(&self) -> Result<(), RepositoryError> {
        if !self.started.swap(true, Ordering::AcqRel) {
            tracing::debug!("ephemeral symbolic memory started");
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), RepositoryError> {
        if self.started.swap(false, Ordering::AcqRel) {
            tracing::debug!("ephemeral symbolic memory stopped");
        }
        Ok(())
    }

    async fn count(&self, collection: &str, query: &Document) -> Result<u64, RepositoryError> {
        self.ensure_started()?;
        let count = self
            .collections
            .get(collection)
            .map(|records| records.iter().filter(|r| matches(&r.fields, query)).count())
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn find(
        &self,
        collection: &str,
        query: &Document,
        options: &FindOptions,
    ) -> Result<Vec<Document>, RepositoryError> {
        self.ensure_started()?;
        let mut docs = self.matching(collection, query);
        if let Some(sort) = &options.sort {
            sort_documents(&mut docs, sort);
        }
        let skip = usize::try_from(options.skip).unwrap_or(usize::MAX);
        let limit = options
            .limit
            .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);
        let page = docs.into_iter().skip(skip).take(limit);
        Ok(match &options.projection {
            Some(fields) => page.map(|d| project(&d, fields)).collect(),
            None => page.collect(),
        })
    }

    async fn find_one(
        &self,
        collection: &str,
        query: &Document,
    ) -> Result<Option<Document>, RepositoryError> {
        self.ensure_started()?;
        Ok(self.matching(collection, query).into_iter().next())
    }

    async fn insert_one(
        &self,
        collection: &str,
        mut document: Document,
    ) -> Result<String, RepositoryError> {
        self.ensure_started()?;
        let id = assign_id(&mut document)?;
        let mut records = self.collections.entry(collection.to_string()).or_default();
        if records.iter().any(|r| r.id == id) {
            return Err(RepositoryError::Conflict(format!(
                "duplicate {ID_FIELD} '{id}' in '{collection}'"
            )));
        }
        records.push(record(collection, id.clone(), document));
        Ok(id)
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<Vec<String>, RepositoryError> {
        self.ensure_started()?;
        let mut prepared = Vec::with_capacity(documents.len());
        for mut document in documents {
            let id = assign_id(&mut document)?;
            prepared.push((id, document));
        }

        let mut records = self.collections.entry(collection.to_string()).or_default();
        for (i, (id, _)) in prepared.iter().enumerate() {
            let clashes_stored = records.iter().any(|r| &r.id == id);
            let clashes_batch = prepared[..i].iter().any(|(other, _)| other == id);
            if clashes_stored || clashes_batch {
                return Err(RepositoryError::Conflict(format!(
                    "duplicate {ID_FIELD} '{id}' in '{collection}'"
                )));
            }
        }
        let ids = prepared.iter().map(|(id, _)| id.clone()).collect();
        records.extend(
            prepared
                .into_iter()
                .map(|(id, document)| record(collection, id, document)),
        );
        Ok(ids)
    }

    async fn update_many(
        &self,
        collection: &str,
        query: &Document,
        patch: &Document,
    ) -> Result<u64, RepositoryError> {
        self.ensure_started()?;
        let Some(mut records) = self.collections.get_mut(collection) else {
            return Ok(0);
        };
        let now = Utc::now();
        let mut updated = 0;
        for r in records.iter_mut().filter(|r| matches(&r.fields, query)) {
            merge_patch(&mut r.fields, patch);
            r.timestamp = now;
            updated += 1;
        }
        Ok(updated)
    }

    async fn upsert_one(
        &self,
        collection: &str,
        query: &Document,
        patch: &Document,
    ) -> Result<(), RepositoryError> {
        self.ensure_started()?;
        let mut records = self.collections.entry(collection.to_string()).or_default();
        let existing = records
            .iter_mut()
            .filter(|r| matches(&r.fields, query))
            .min_by(|a, b| a.id.cmp(&b.id));
        match existing {
            Some(r) => {
                merge_patch(&mut r.fields, patch);
                r.timestamp = Utc::now();
            }
            None => {
                let mut document = document_from_query(query);
                merge_patch(&mut document, patch);
                if let Some(id) = query.get(ID_FIELD) {
                    document.insert(ID_FIELD.to_string(), id.clone());
                }
                let id = assign_id(&mut document)?;
                records.push(record(collection, id, document));
            }
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, query: &Document) -> Result<u64, RepositoryError> {
        self.ensure_started()?;
        let Some(mut records) = self.collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = records.len();
        records.retain(|r| !matches(&r.fields, query));
        Ok((before - records.len()) as u64)
    }
}
