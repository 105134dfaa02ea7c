//! Similarity memory trait.
//!
//! Stores caller-supplied embedding vectors with metadata and answers
//! nearest-neighbour queries. Computing embeddings is the caller's job.

use agentry_types::error::RepositoryError;
use agentry_types::memory::{Document, SimilarityHit};

/// Trait for vector similarity search.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
/// Implementations live in agentry-infra.
pub trait SimilarityMemory: Send + Sync {
    fn start(&self) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn stop(&self) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Insert or replace the vector stored under `id`.
    fn insert(
        &self,
        collection: &str,
        id: &str,
        vector: Vec<f32>,
        metadata: Document,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Return up to `top_k` entries ranked by descending similarity to `vector`.
    fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> impl std::future::Future<Output = Result<Vec<SimilarityHit>, RepositoryError>> + Send;

    /// Remove the entry stored under `id`. Returns whether it existed.
    fn delete(
        &self,
        collection: &str,
        id: &str,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}
