//! The memory bundle handed to the orchestrator and to action handlers.

use agentry_types::error::RepositoryError;

use super::box_file::BoxFileMemory;
use super::box_similarity::BoxSimilarityMemory;
use super::box_symbolic::BoxSymbolicMemory;

/// Symbolic memory (required) plus optional file and similarity stores.
///
/// Started once at startup and stopped at shutdown; each store's own
/// `start`/`stop` is idempotent, so repeating either call is harmless.
pub struct AgentMemory {
    symbolic: BoxSymbolicMemory,
    file: Option<BoxFileMemory>,
    similarity: Option<BoxSimilarityMemory>,
}

impl AgentMemory {
    pub fn new(symbolic: BoxSymbolicMemory) -> Self {
        Self {
            symbolic,
            file: None,
            similarity: None,
        }
    }

    pub fn with_file(mut self, file: BoxFileMemory) -> Self {
        self.file = Some(file);
        self
    }

    pub fn with_similarity(mut self, similarity: BoxSimilarityMemory) -> Self {
        self.similarity = Some(similarity);
        self
    }

    pub fn symbolic(&self) -> &BoxSymbolicMemory {
        &self.symbolic
    }

    pub fn file(&self) -> Option<&BoxFileMemory> {
        self.file.as_ref()
    }

    pub fn similarity(&self) -> Option<&BoxSimilarityMemory> {
        self.similarity.as_ref()
    }

    /// Start every configured store, symbolic first.
    pub async fn start(&self) -> Result<(), RepositoryError> {
        self.symbolic.start().await?;
        if let Some(file) = &self.file {
            file.start().await?;
        }
        if let Some(similarity) = &self.similarity {
            similarity.start().await?;
        }
        tracing::info!(
            file = self.file.is_some(),
            similarity = self.similarity.is_some(),
            "agent memory started"
        );
        Ok(())
    }

    /// Stop every configured store. All stores are attempted; the first error
    /// is returned.
    pub async fn stop(&self) -> Result<(), RepositoryError> {
        let mut first_err = None;
        if let Some(similarity) = &self.similarity {
            if let Err(e) = similarity.stop().await {
                tracing::warn!(error = %e, "failed to stop similarity memory");
                first_err.get_or_insert(e);
            }
        }
        if let Some(file) = &self.file {
            if let Err(e) = file.stop().await {
                tracing::warn!(error = %e, "failed to stop file memory");
                first_err.get_or_insert(e);
            }
        }
        if let Err(e) = self.symbolic.stop().await {
            tracing::warn!(error = %e, "failed to stop symbolic memory");
            first_err.get_or_insert(e);
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
