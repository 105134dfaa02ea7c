//! Assemble the memory bundle selected by configuration.

use std::path::{Path, PathBuf};

use agentry_core::memory::{
    AgentMemory, BoxFileMemory, BoxSimilarityMemory, BoxSymbolicMemory, EphemeralSymbolicMemory,
};
use agentry_types::config::{FileBackend, MemoryConfig, SimilarityBackend, SymbolicBackend};

use crate::sqlite::pool::database_url;
use crate::sqlite::symbolic::SqliteSymbolicMemory;
use crate::storage::file::{DEFAULT_FILE_DIR, LocalFileMemory};
use crate::vector::similarity::InMemorySimilarityMemory;

/// Build an unstarted [`AgentMemory`] for `config`, resolving default
/// locations under `data_dir`.
pub fn build_agent_memory(config: &MemoryConfig, data_dir: &Path) -> AgentMemory {
    let symbolic = match config.symbolic {
        SymbolicBackend::Sqlite => {
            let url = config
                .database_url
                .clone()
                .unwrap_or_else(|| database_url(data_dir));
            BoxSymbolicMemory::new(SqliteSymbolicMemory::new(url))
        }
        SymbolicBackend::Ephemeral => BoxSymbolicMemory::new(EphemeralSymbolicMemory::new()),
    };
    let mut memory = AgentMemory::new(symbolic);

    if config.file == FileBackend::Local {
        let root = config
            .file_root
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join(DEFAULT_FILE_DIR));
        memory = memory.with_file(BoxFileMemory::new(LocalFileMemory::new(root)));
    }
    if config.similarity == SimilarityBackend::Memory {
        memory = memory.with_similarity(BoxSimilarityMemory::new(InMemorySimilarityMemory::new()));
    }

    tracing::debug!(
        symbolic = ?config.symbolic,
        file = ?config.file,
        similarity = ?config.similarity,
        "memory backends selected"
    );
    memory
}
