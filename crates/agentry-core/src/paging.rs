//! Paged listing over any symbolic collection.
//!
//! The page fetch and the total count are issued concurrently and
//! independently; no snapshot isolation is assumed between them.

use agentry_types::error::RepositoryError;
use agentry_types::memory::{Document, FindOptions, SortSpec};
use agentry_types::paging::{Page, PageRequest};

use crate::memory::BoxSymbolicMemory;

/// Fetch one page of `collection` matching `filter`, sorted on `sort_key`.
///
/// `has_next` is `skip + returned < total_count`. Because the count may race
/// concurrent writes, `total_count` can disagree with what a later page returns.
pub async fn query_page(
    memory: &BoxSymbolicMemory,
    collection: &str,
    filter: &Document,
    request: &PageRequest,
    sort_key: &str,
) -> Result<Page<Document>, RepositoryError> {
    let options = FindOptions::sorted(SortSpec {
        field: sort_key.to_string(),
        direction: request.sort,
    })
    .skip(request.skip)
    .limit(request.limit);

    let (items, total_count) = tokio::join!(
        memory.find(collection, filter, &options),
        memory.count(collection, filter),
    );
    let items = items?;
    let total_count = total_count?;
    let has_next = request.skip + (items.len() as u64) < total_count;

    tracing::debug!(
        collection,
        skip = request.skip,
        limit = request.limit,
        returned = items.len(),
        total_count,
        "queried page"
    );

    Ok(Page {
        items,
        total_count,
        has_next,
    })
}
