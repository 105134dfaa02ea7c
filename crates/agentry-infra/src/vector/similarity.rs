//! In-process similarity memory.
//!
//! Implements `SimilarityMemory` from `agentry-core` with a brute-force cosine
//! scan over a `DashMap` per collection. Every vector in a collection must
//! share the dimension of the first one inserted.

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use agentry_core::memory::SimilarityMemory;
use agentry_types::error::RepositoryError;
use agentry_types::memory::{Document, SimilarityHit};
use dashmap::DashMap;

struct Entry {
    vector: Vec<f32>,
    norm: f32,
    metadata: Document,
}

#[derive(Default)]
struct Collection {
    dimension: usize,
    entries: HashMap<String, Entry>,
}

/// `DashMap`-backed implementation of `SimilarityMemory`.
#[derive(Default)]
pub struct InMemorySimilarityMemory {
    collections: DashMap<String, Collection>,
    started: AtomicBool,
}

impl InMemorySimilarityMemory {
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
}

fn norm(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity; zero vectors score 0.
fn cosine(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / (a_norm * b_norm)
}

fn dimension_mismatch(collection: &str, expected: usize, got: usize) -> RepositoryError {
    RepositoryError::Query(format!(
        "vector dimension {got} does not match collection '{collection}' dimension {expected}"
    ))
}

impl SimilarityMemory for InMemorySimilarityMemory {
    async fn start(&self) -> Result<(), RepositoryError> {
        if !self.started.swap(true, Ordering::AcqRel) {
            tracing::debug!("in-memory similarity memory started");
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), RepositoryError> {
        if self.started.swap(false, Ordering::AcqRel) {
            tracing::debug!("in-memory similarity memory stopped");
        }
        Ok(())
    }

    async fn insert(
        &self,
        collection: &str,
        id: &str,
        vector: Vec<f32>,
        metadata: Document,
    ) -> Result<(), RepositoryError> {
        self.ensure_started()?;
        if vector.is_empty() {
            return Err(RepositoryError::Query("vector must not be empty".to_string()));
        }
        let mut entry = self.collections.entry(collection.to_string()).or_default();
        if entry.entries.is_empty() {
            entry.dimension = vector.len();
        } else if entry.dimension != vector.len() {
            return Err(dimension_mismatch(collection, entry.dimension, vector.len()));
        }
        let norm = norm(&vector);
        entry.entries.insert(
            id.to_string(),
            Entry {
                vector,
                norm,
                metadata,
            },
        );
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SimilarityHit>, RepositoryError> {
        self.ensure_started()?;
        let Some(entry) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };
        if entry.entries.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        if entry.dimension != vector.len() {
            return Err(dimension_mismatch(collection, entry.dimension, vector.len()));
        }

        let query_norm = norm(vector);
        let mut hits: Vec<SimilarityHit> = entry
            .entries
            .iter()
            .map(|(id, e)| SimilarityHit {
                id: id.clone(),
                score: cosine(vector, query_norm, &e.vector, e.norm),
                metadata: e.metadata.clone(),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(CmpOrdering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, RepositoryError> {
        self.ensure_started()?;
        Ok(self
            .collections
            .get_mut(collection)
            .map(|mut c| c.entries.remove(id).is_some())
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(label: &str) -> Document {
        json!({ "label": label }).as_object().cloned().unwrap()
    }

    async fn seeded() -> InMemorySimilarityMemory {
        let memory = InMemorySimilarityMemory::new();
        memory.start().await.unwrap();
        memory.insert("facts", "x", vec![1.0, 0.0], meta("east")).await.unwrap();
        memory.insert("facts", "y", vec![0.0, 1.0], meta("north")).await.unwrap();
        memory.insert("facts", "xy", vec![1.0, 1.0], meta("northeast")).await.unwrap();
        memory
    }

    #[tokio::test]
    async fn nearest_first() {
        let memory = seeded().await;
        let hits = memory.query("facts", &[0.9, 0.1], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "x");
        assert_eq!(hits[1].id, "xy");
        assert!(hits[0].score > hits[1].score);
        assert_eq!(hits[0].metadata["label"], json!("east"));
    }

    #[tokio::test]
    async fn insert_replaces_and_delete_removes() {
        let memory = seeded().await;
        memory.insert("facts", "x", vec![0.0, -1.0], meta("south")).await.unwrap();
        let hits = memory.query("facts", &[0.0, -1.0], 1).await.unwrap();
        assert_eq!(hits[0].id, "x");
        assert!((hits[0].score - 1.0).abs() < 1e-6);

        assert!(memory.delete("facts", "x").await.unwrap());
        assert!(!memory.delete("facts", "x").await.unwrap());
        assert_eq!(memory.query("facts", &[1.0, 0.0], 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn dimension_is_enforced() {
        let memory = seeded().await;
        assert!(memory.insert("facts", "z", vec![1.0, 2.0, 3.0], meta("z")).await.is_err());
        assert!(memory.query("facts", &[1.0], 3).await.is_err());
        assert!(memory.query("empty", &[1.0], 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn requires_start() {
        let memory = InMemorySimilarityMemory::new();
        let err = memory.query("facts", &[1.0], 1).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotStarted));
    }
}
