//! BoxFileMemory -- object-safe dynamic dispatch wrapper for FileMemory.

use std::future::Future;
use std::pin::Pin;

use agentry_types::error::RepositoryError;

use super::file::FileMemory;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RepositoryError>> + Send + 'a>>;

/// Object-safe version of [`FileMemory`] with boxed futures.
pub trait FileMemoryDyn: Send + Sync {
    fn start_boxed(&self) -> BoxFuture<'_, ()>;

    fn stop_boxed(&self) -> BoxFuture<'_, ()>;

    fn read_file_boxed<'a>(&'a self, scope: &'a str, path: &'a str) -> BoxFuture<'a, Vec<u8>>;

    fn write_file_boxed<'a>(
        &'a self,
        scope: &'a str,
        path: &'a str,
        contents: &'a [u8],
    ) -> BoxFuture<'a, ()>;
}

impl<T: FileMemory> FileMemoryDyn for T {
    fn start_boxed(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.start())
    }

    fn stop_boxed(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.stop())
    }

    fn read_file_boxed<'a>(&'a self, scope: &'a str, path: &'a str) -> BoxFuture<'a, Vec<u8>> {
        Box::pin(self.read_file(scope, path))
    }

    fn write_file_boxed<'a>(
        &'a self,
        scope: &'a str,
        path: &'a str,
        contents: &'a [u8],
    ) -> BoxFuture<'a, ()> {
        Box::pin(self.write_file(scope, path, contents))
    }
}

/// Type-erased file memory.
pub struct BoxFileMemory {
    inner: Box<dyn FileMemoryDyn + Send + Sync>,
}

impl BoxFileMemory {
    pub fn new<T: FileMemory + 'static>(store: T) -> Self {
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

    pub async fn read_file(&self, scope: &str, path: &str) -> Result<Vec<u8>, RepositoryError> {
        self.inner.read_file_boxed(scope, path).await
    }

    pub async fn write_file(
        &self,
        scope: &str,
        path: &str,
        contents: &[u8],
    ) -> Result<(), RepositoryError> {
        self.inner.write_file_boxed(scope, path, contents).await
    }
}
