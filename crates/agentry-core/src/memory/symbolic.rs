//! Symbolic memory trait.
//!
//! A document store addressed by collection name, queried by example.
//! Implementations (SQLite, in-process) live in agentry-infra and
//! [`super::ephemeral`].

use agentry_types::error::RepositoryError;
use agentry_types::memory::{Document, FindOptions};

/// Trait for schemaless document storage.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
/// `start` and `stop` are idempotent: starting twice reuses the existing
/// connection, stopping a store that never started is a no-op. Every other
/// operation fails with [`RepositoryError::NotStarted`] while stopped.
pub trait SymbolicMemory: Send + Sync {
    /// Open the underlying connection if it is not open yet.
    fn start(&self) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Close the underlying connection if it is open.
    fn stop(&self) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Count documents matching `query`.
    fn count(
        &self,
        collection: &str,
        query: &Document,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Find documents matching `query`, honoring sort, skip, limit and projection.
    fn find(
        &self,
        collection: &str,
        query: &Document,
        options: &FindOptions,
    ) -> impl std::future::Future<Output = Result<Vec<Document>, RepositoryError>> + Send;

    /// First document matching `query` in `_id` order.
    fn find_one(
        &self,
        collection: &str,
        query: &Document,
    ) -> impl std::future::Future<Output = Result<Option<Document>, RepositoryError>> + Send;

    /// Insert one document and return its `_id` (generated when absent).
    ///
    /// Fails with [`RepositoryError::Conflict`] if the `_id` already exists.
    fn insert_one(
        &self,
        collection: &str,
        document: Document,
    ) -> impl std::future::Future<Output = Result<String, RepositoryError>> + Send;

    /// Insert several documents atomically where the backend allows it.
    fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> impl std::future::Future<Output = Result<Vec<String>, RepositoryError>> + Send;

    /// Merge-patch every document matching `query`. Returns the number updated.
    fn update_many(
        &self,
        collection: &str,
        query: &Document,
        patch: &Document,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Merge-patch the first document matching `query`, or insert the query's
    /// fields merged with `patch` when nothing matches.
    fn upsert_one(
        &self,
        collection: &str,
        query: &Document,
        patch: &Document,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete every document matching `query`. Returns the number deleted.
    fn delete(
        &self,
        collection: &str,
        query: &Document,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}
