//! File memory trait.
//!
//! Byte storage addressed by `(scope, relative path)`. Handlers usually scope
//! by agent or process so that processes cannot see each other's files.

use agentry_types::error::RepositoryError;

/// Trait for scoped file storage.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
/// Implementations live in agentry-infra.
pub trait FileMemory: Send + Sync {
    fn start(&self) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn stop(&self) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Read a whole file. Missing files yield [`RepositoryError::NotFound`].
    fn read_file(
        &self,
        scope: &str,
        path: &str,
    ) -> impl std::future::Future<Output = Result<Vec<u8>, RepositoryError>> + Send;

    /// Create or replace a file, creating parent directories.
    ///
    /// Paths that are absolute or escape the scope with `..` are rejected with
    /// [`RepositoryError::InvalidPath`].
    fn write_file(
        &self,
        scope: &str,
        path: &str,
        contents: &[u8],
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
