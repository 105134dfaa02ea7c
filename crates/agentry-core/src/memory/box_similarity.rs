//! BoxSimilarityMemory -- object-safe dynamic dispatch wrapper for SimilarityMemory.

use std::future::Future;
use std::pin::Pin;

use agentry_types::error::RepositoryError;
use agentry_types::memory::{Document, SimilarityHit};

use super::similarity::SimilarityMemory;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RepositoryError>> + Send + 'a>>;

/// Object-safe version of [`SimilarityMemory`] with boxed futures.
pub trait SimilarityMemoryDyn: Send + Sync {
    fn start_boxed(&self) -> BoxFuture<'_, ()>;

    fn stop_boxed(&self) -> BoxFuture<'_, ()>;

    fn insert_boxed<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        vector: Vec<f32>,
        metadata: Document,
    ) -> BoxFuture<'a, ()>;

    fn query_boxed<'a>(
        &'a self,
        collection: &'a str,
        vector: &'a [f32],
        top_k: usize,
    ) -> BoxFuture<'a, Vec<SimilarityHit>>;

    fn delete_boxed<'a>(&'a self, collection: &'a str, id: &'a str) -> BoxFuture<'a, bool>;
}

impl<T: SimilarityMemory> SimilarityMemoryDyn for T {
    fn start_boxed(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.start())
    }

    fn stop_boxed(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.stop())
    }

    fn insert_boxed<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        vector: Vec<f32>,
        metadata: Document,
    ) -> BoxFuture<'a, ()> {
        Box::pin(self.insert(collection, id, vector, metadata))
    }

    fn query_boxed<'a>(
        &'a self,
        collection: &'a str,
        vector: &'a [f32],
        top_k: usize,
    ) -> BoxFuture<'a, Vec<SimilarityHit>> {
        Box::pin(self.query(collection, vector, top_k))
    }

    fn delete_boxed<'a>(&'a self, collection: &'a str, id: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(self.delete(collection, id))
    }
}

/// Type-erased similarity memory.
pub struct BoxSimilarityMemory {
    inner: Box<dyn SimilarityMemoryDyn + Send + Sync>,
}

impl BoxSimilarityMemory {
    pub fn new<T: SimilarityMemory + 'static>(store: T) -> Self {
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

    pub async fn insert(
        &self,
        collection: &str,
        id: &str,
        vector: Vec<f32>,
        metadata: Document,
    ) -> Result<(), RepositoryError> {
        self.inner.insert_boxed(collection, id, vector, metadata).await
    }

    pub async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SimilarityHit>, RepositoryError> {
        self.inner.query_boxed(collection, vector, top_k).await
    }

    pub async fn delete(&self, collection: &str, id: &str) -> Result<bool, RepositoryError> {
        self.inner.delete_boxed(collection, id).await
    }
}
