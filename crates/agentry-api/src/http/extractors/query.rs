//! Query parameter extractors for list endpoints.

use serde::Deserialize;

use agentry_types::paging::{DEFAULT_PAGE_LIMIT, PageRequest, SortDirection};

use crate::http::error::AppError;

/// Query parameters for the process list endpoint.
#[derive(Debug, Deserialize, Default)]
pub struct ProcessListQuery {
    /// Page size; clamped by the orchestrator.
    pub limit: Option<u64>,
    /// Number of processes to skip.
    pub skip: Option<u64>,
    /// `ascending` or `descending` by last update.
    pub sort: Option<String>,
}

impl ProcessListQuery {
    pub fn page_request(&self) -> Result<PageRequest, AppError> {
        let sort = match &self.sort {
            Some(s) => s.parse::<SortDirection>().map_err(AppError::Validation)?,
            None => SortDirection::default(),
        };
        Ok(PageRequest::new(
            self.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
            self.skip.unwrap_or(0),
            sort,
        ))
    }
}
