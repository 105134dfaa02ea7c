//! Paged listing request and result types.

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Default number of items per page.
pub const DEFAULT_PAGE_LIMIT: u64 = 20;

/// Sort direction for listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Ascending => write!(f, "ascending"),
            SortDirection::Descending => write!(f, "descending"),
        }
    }
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Ascending),
            "desc" | "descending" => Ok(SortDirection::Descending),
            other => Err(format!("invalid sort direction: '{other}'")),
        }
    }
}

/// Which page of a listing to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub skip: u64,
    #[serde(default)]
    pub sort: SortDirection,
}

fn default_limit() -> u64 {
    DEFAULT_PAGE_LIMIT
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            skip: 0,
            sort: SortDirection::Ascending,
        }
    }
}

impl PageRequest {
    pub fn new(limit: u64, skip: u64, sort: SortDirection) -> Self {
        Self { limit, skip, sort }
    }

    /// Clamp `limit` into `1..=max_limit`.
    pub fn clamped(self, max_limit: u64) -> Self {
        Self {
            limit: self.limit.clamp(1, max_limit.max(1)),
            ..self
        }
    }

    /// The request for the page that follows this one.
    pub fn next(&self) -> Self {
        Self {
            skip: self.skip + self.limit,
            ..*self
        }
    }
}

/// One page of a listing.
///
/// `total_count` comes from a count issued independently of the fetch, so it
/// may disagree with `items` when writes race the listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: u64,
    pub has_next: bool,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total_count: self.total_count,
            has_next: self.has_next,
        }
    }
}
