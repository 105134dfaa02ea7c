//! BoxSymbolicMemory -- object-safe dynamic dispatch wrapper for SymbolicMemory.
//!
//! 1. Define an object-safe `SymbolicMemoryDyn` trait with boxed futures
//! 2. Blanket-impl `SymbolicMemoryDyn` for all `T: SymbolicMemory`
//! 3. `BoxSymbolicMemory` wraps `Box<dyn SymbolicMemoryDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use agentry_types::error::RepositoryError;
use agentry_types::memory::{Document, FindOptions};

use super::symbolic::SymbolicMemory;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RepositoryError>> + Send + 'a>>;

/// Object-safe version of [`SymbolicMemory`] with boxed futures.
///
/// A blanket implementation is provided for all types implementing `SymbolicMemory`.
pub trait SymbolicMemoryDyn: Send + Sync {
    fn start_boxed(&self) -> BoxFuture<'_, ()>;

    fn stop_boxed(&self) -> BoxFuture<'_, ()>;

    fn count_boxed<'a>(&'a self, collection: &'a str, query: &'a Document) -> BoxFuture<'a, u64>;

    fn find_boxed<'a>(
        &'a self,
        collection: &'a str,
        query: &'a Document,
        options: &'a FindOptions,
    ) -> BoxFuture<'a, Vec<Document>>;

    fn find_one_boxed<'a>(
        &'a self,
        collection: &'a str,
        query: &'a Document,
    ) -> BoxFuture<'a, Option<Document>>;

    fn insert_one_boxed<'a>(&'a self, collection: &'a str, document: Document)
    -> BoxFuture<'a, String>;

    fn insert_many_boxed<'a>(
        &'a self,
        collection: &'a str,
        documents: Vec<Document>,
    ) -> BoxFuture<'a, Vec<String>>;

    fn update_many_boxed<'a>(
        &'a self,
        collection: &'a str,
        query: &'a Document,
        patch: &'a Document,
    ) -> BoxFuture<'a, u64>;

    fn upsert_one_boxed<'a>(
        &'a self,
        collection: &'a str,
        query: &'a Document,
        patch: &'a Document,
    ) -> BoxFuture<'a, ()>;

    fn delete_boxed<'a>(&'a self, collection: &'a str, query: &'a Document) -> BoxFuture<'a, u64>;
}

impl<T: SymbolicMemory> SymbolicMemoryDyn for T {
    fn start_boxed(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.start())
    }

    fn stop_boxed(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.stop())
    }

    fn count_boxed<'a>(&'a self, collection: &'a str, query: &'a Document) -> BoxFuture<'a, u64> {
        Box::pin(self.count(collection, query))
    }

    fn find_boxed<'a>(
        &'a self,
        collection: &'a str,
        query: &'a Document,
        options: &'a FindOptions,
    ) -> BoxFuture<'a, Vec<Document>> {
        Box::pin(self.find(collection, query, options))
    }

    fn find_one_boxed<'a>(
        &'a self,
        collection: &'a str,
        query: &'a Document,
    ) -> BoxFuture<'a, Option<Document>> {
        Box::pin(self.find_one(collection, query))
    }

    fn insert_one_boxed<'a>(
        &'a self,
        collection: &'a str,
        document: Document,
    ) -> BoxFuture<'a, String> {
        Box::pin(self.insert_one(collection, document))
    }

    fn insert_many_boxed<'a>(
        &'a self,
        collection: &'a str,
        documents: Vec<Document>,
    ) -> BoxFuture<'a, Vec<String>> {
        Box::pin(self.insert_many(collection, documents))
    }

    fn update_many_boxed<'a>(
        &'a self,
        collection: &'a str,
        query: &'a Document,
        patch: &'a Document,
    ) -> BoxFuture<'a, u64> {
        Box::pin(self.update_many(collection, query, patch))
    }

    fn upsert_one_boxed<'a>(
        &'a self,
        collection: &'a str,
        query: &'a Document,
        patch: &'a Document,
    ) -> BoxFuture<'a, ()> {
        Box::pin(self.upsert_one(collection, query, patch))
    }

    fn delete_boxed<'a>(&'a self, collection: &'a str, query: &'a Document) -> BoxFuture<'a, u64> {
        Box::pin(self.delete(collection, query))
    }
}

/// Type-erased symbolic memory for runtime backend selection.
///
/// Since `SymbolicMemory` uses RPITIT, it cannot be used as a trait object
/// directly. `BoxSymbolicMemory` provides equivalent methods that delegate
/// to the inner `SymbolicMemoryDyn` trait object.
pub struct BoxSymbolicMemory {
    inner: Box<dyn SymbolicMemoryDyn + Send + Sync>,
}

impl BoxSymbolicMemory {
    /// Wrap a concrete `SymbolicMemory` in a type-erased box.
    pub fn new<T: SymbolicMemory + 'static>(store: T) -> Self {
        Self {
            inner: Box::new(store),
        }
    }

    pub async fn start(&self) -> Result<(), RepositoryError> {
        self.inner.start_boxed().await
    }

    pub async fn stop(&self) -> Result<(), RepositoryError> {
        self.inner.stop_boxed().await
    }

    pub async fn count(&self, collection: &str, query: &Document) -> Result<u64, RepositoryError> {
        self.inner.count_boxed(collection, query).await
    }

    pub async fn find(
        &self,
        collection: &str,
        query: &Document,
        options: &FindOptions,
    ) -> Result<Vec<Document>, RepositoryError> {
        self.inner.find_boxed(collection, query, options).await
    }

    pub async fn find_one(
        &self,
        collection: &str,
        query: &Document,
    ) -> Result<Option<Document>, RepositoryError> {
        self.inner.find_one_boxed(collection, query).await
    }

    pub async fn insert_one(
        &self,
        collection: &str,
        document: Document,
    ) -> Result<String, RepositoryError> {
        self.inner.insert_one_boxed(collection, document).await
    }

    pub async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<Vec<String>, RepositoryError> {
        self.inner.insert_many_boxed(collection, documents).await
    }

    pub async fn update_many(
        &self,
        collection: &str,
        query: &Document,
        patch: &Document,
    ) -> Result<u64, RepositoryError> {
        self.inner.update_many_boxed(collection, query, patch).await
    }

    pub async fn upsert_one(
        &self,
        collection: &str,
        query: &Document,
        patch: &Document,
    ) -> Result<(), RepositoryError> {
        self.inner.upsert_one_boxed(collection, query, patch).await
    }

    pub async fn delete(&self, collection: &str, query: &Document) -> Result<u64, RepositoryError> {
        self.inner.delete_boxed(collection, query).await
    }
}
