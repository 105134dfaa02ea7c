//! Memory subsystem types shared by the store traits and their backends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::paging::SortDirection;

/// A schemaless symbolic document. Every stored document carries a string `_id`.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Field holding a document's identifier.
pub const ID_FIELD: &str = "_id";

/// Sort key for `find`. Dotted paths address nested fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// Options for a symbolic `find`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortSpec>,
    #[serde(default)]
    pub skip: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// Fields to keep in returned documents (`_id` is always kept).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<Vec<String>>,
}

impl FindOptions {
    pub fn sorted(sort: SortSpec) -> Self {
        Self {
            sort: Some(sort),
            ..Self::default()
        }
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn project<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(fields.into_iter().map(Into::into).collect());
        self
    }
}

/// A stored symbolic document together with its bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub collection: String,
    pub id: String,
    pub fields: Document,
    /// Last time the record was written.
    pub timestamp: DateTime<Utc>,
}

/// A ranked result from a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityHit {
    pub id: String,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
    pub metadata: Document,
}
