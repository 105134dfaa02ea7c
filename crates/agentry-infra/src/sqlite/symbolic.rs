//! SQLite-backed symbolic memory.
//!
//! Implements `SymbolicMemory` from `agentry-core`. Every collection shares the
//! `memory_documents` table; a document's JSON body is stored whole and
//! string-equality filters, sorting, skip and limit are pushed down to
//! SQLite through `json_extract`. Queries SQLite cannot express exactly fall
//! back to in-process evaluation with the same query-by-example rules as the
//! ephemeral backend, so both backends agree on results.

use agentry_core::memory::SymbolicMemory;
use agentry_core::memory::assign_id;
use agentry_core::memory::query::{document_from_query, matches, merge_patch, project, sort_documents};
use agentry_types::error::RepositoryError;
use agentry_types::memory::{Document, FindOptions, ID_FIELD, SortSpec};
use agentry_types::paging::SortDirection;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{QueryBuilder, Row, Sqlite};
use tokio::sync::RwLock;

use super::pool::DatabasePool;

/// SQLite implementation of `SymbolicMemory`.
///
/// The pool is opened by `start` and closed by `stop`; the store can be
/// restarted and sees everything written before.
pub struct SqliteSymbolicMemory {
    database_url: String,
    pool: RwLock<Option<DatabasePool>>,
}

impl SqliteSymbolicMemory {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            pool: RwLock::new(None),
        }
    }

    async fn pool(&self) -> Result<DatabasePool, RepositoryError> {
        self.pool.read().await.clone().ok_or(RepositoryError::NotStarted)
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct DocumentRow {
    id: String,
    body: String,
}

impl DocumentRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            body: row.try_get("body")?,
        })
    }

    fn into_document(self) -> Result<Document, RepositoryError> {
        serde_json::from_str(&self.body).map_err(|e| {
            RepositoryError::Query(format!("invalid JSON body for document '{}': {e}", self.id))
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn query_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

fn insert_error(e: sqlx::Error, collection: &str, id: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.is_unique_violation() {
            return RepositoryError::Conflict(format!(
                "duplicate {ID_FIELD} '{id}' in '{collection}'"
            ));
        }
    }
    RepositoryError::Query(e.to_string())
}

fn encode(document: &Document) -> Result<String, RepositoryError> {
    serde_json::to_string(document)
        .map_err(|e| RepositoryError::Query(format!("failed to serialize document: {e}")))
}

/// Paths safe to inline into a JSON path literal.
fn is_simple_path(path: &str) -> bool {
    !path.is_empty()
        && path
            .split('.')
            .all(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
}

/// Append `AND` clauses for every pair SQLite can evaluate exactly.
///
/// Returns true when the whole query was pushed down.
fn push_filters(builder: &mut QueryBuilder<'static, Sqlite>, query: &Document) -> bool {
    let mut complete = true;
    for (path, expected) in query {
        match expected {
            Value::String(s) if path == ID_FIELD => {
                builder.push(" AND id = ").push_bind(s.clone());
            }
            Value::String(s) if is_simple_path(path) => {
                builder
                    .push(format!(" AND json_extract(body, '$.{path}') = "))
                    .push_bind(s.clone());
            }
            _ => complete = false,
        }
    }
    complete
}

/// Append the ORDER BY clause for `sort`, defaulting to `_id` order.
///
/// Values are ranked by JSON type first (missing or null, numbers, strings,
/// booleans, arrays, objects) to agree with `compare_values`. The caller has
/// already checked the sort path with `is_simple_path`.
fn push_order(builder: &mut QueryBuilder<'static, Sqlite>, sort: Option<&SortSpec>) {
    let Some(sort) = sort else {
        builder.push(" ORDER BY id");
        return;
    };
    let dir = match sort.direction {
        SortDirection::Ascending => "ASC",
        SortDirection::Descending => "DESC",
    };
    let path = &sort.field;
    builder.push(format!(
        " ORDER BY CASE json_type(body, '$.{path}') \
         WHEN 'integer' THEN 1 WHEN 'real' THEN 1 WHEN 'text' THEN 2 \
         WHEN 'true' THEN 3 WHEN 'false' THEN 3 WHEN 'array' THEN 4 WHEN 'object' THEN 5 \
         ELSE 0 END {dir}, json_extract(body, '$.{path}') {dir}, id {dir}"
    ));
}

fn sql_count(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Documents of `collection` matching `query`, ordered and paged by `options`.
///
/// When every filter and the sort key translate to SQL, ordering, skip and
/// limit run in SQLite. Otherwise every candidate row is loaded and the
/// remaining work happens in process. Projection is left to the caller.
async fn select<'e, E>(
    executor: E,
    collection: &str,
    query: &Document,
    options: &FindOptions,
) -> Result<Vec<Document>, RepositoryError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let mut builder = QueryBuilder::new("SELECT id, body FROM memory_documents WHERE collection = ");
    builder.push_bind(collection.to_string());
    let filtered = push_filters(&mut builder, query);
    let pushed = filtered
        && options
            .sort
            .as_ref()
            .is_none_or(|sort| is_simple_path(&sort.field));
    if pushed {
        push_order(&mut builder, options.sort.as_ref());
        builder
            .push(" LIMIT ")
            .push_bind(options.limit.map_or(-1, sql_count))
            .push(" OFFSET ")
            .push_bind(sql_count(options.skip));
    } else {
        builder.push(" ORDER BY id");
    }

    let rows = builder.build().fetch_all(executor).await.map_err(query_error)?;
    let mut documents = Vec::with_capacity(rows.len());
    for row in &rows {
        let document = DocumentRow::from_row(row).map_err(query_error)?.into_document()?;
        if pushed || matches(&document, query) {
            documents.push(document);
        }
    }
    if pushed {
        return Ok(documents);
    }

    tracing::debug!(collection, rows = rows.len(), "symbolic find evaluated in process");
    if let Some(sort) = &options.sort {
        sort_documents(&mut documents, sort);
    }
    let skip = usize::try_from(options.skip).unwrap_or(usize::MAX);
    let limit = options
        .limit
        .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
        .unwrap_or(usize::MAX);
    Ok(documents.into_iter().skip(skip).take(limit).collect())
}

/// Every document of `collection` matching `query`, in `_id` order.
async fn load<'e, E>(executor: E, collection: &str, query: &Document) -> Result<Vec<Document>, RepositoryError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    select(executor, collection, query, &FindOptions::default()).await
}

fn document_id(document: &Document) -> Result<String, RepositoryError> {
    document
        .get(ID_FIELD)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RepositoryError::Query(format!("stored document missing {ID_FIELD}")))
}

async fn insert_document<'e, E>(
    executor: E,
    collection: &str,
    id: &str,
    document: &Document,
) -> Result<(), RepositoryError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let now = format_datetime(&Utc::now());
    sqlx::query(
        "INSERT INTO memory_documents (collection, id, body, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(collection)
    .bind(id)
    .bind(encode(document)?)
    .bind(&now)
    .bind(&now)
    .execute(executor)
    .await
    .map_err(|e| insert_error(e, collection, id))?;
    Ok(())
}

async fn replace_document<'e, E>(
    executor: E,
    collection: &str,
    document: &Document,
) -> Result<(), RepositoryError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE memory_documents SET body = ?, updated_at = ? WHERE collection = ? AND id = ?")
        .bind(encode(document)?)
        .bind(format_datetime(&Utc::now()))
        .bind(collection)
        .bind(document_id(document)?)
        .execute(executor)
        .await
        .map_err(query_error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// SymbolicMemory implementation
// ---------------------------------------------------------------------------

impl SymbolicMemory for SqliteSymbolicMemory {
    async fn start(&self) -> Result<(), RepositoryError> {
        let mut guard = self.pool.write().await;
        if guard.is_some() {
            return Ok(());
        }
        let pool = DatabasePool::new(&self.database_url).await.map_err(|e| {
            tracing::error!(database_url = %self.database_url, error = %e, "failed to open symbolic memory");
            RepositoryError::Connection
        })?;
        *guard = Some(pool);
        tracing::info!(database_url = %self.database_url, "sqlite symbolic memory started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), RepositoryError> {
        if let Some(pool) = self.pool.write().await.take() {
            pool.close().await;
            tracing::info!(database_url = %self.database_url, "sqlite symbolic memory stopped");
        }
        Ok(())
    }

    async fn count(&self, collection: &str, query: &Document) -> Result<u64, RepositoryError> {
        let pool = self.pool().await?;
        let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM memory_documents WHERE collection = ");
        builder.push_bind(collection.to_string());
        if push_filters(&mut builder, query) {
            let (count,): (i64,) = builder
                .build_query_as()
                .fetch_one(&pool.reader)
                .await
                .map_err(query_error)?;
            return Ok(count.max(0) as u64);
        }
        Ok(load(&pool.reader, collection, query).await?.len() as u64)
    }

    async fn find(
        &self,
        collection: &str,
        query: &Document,
        options: &FindOptions,
    ) -> Result<Vec<Document>, RepositoryError> {
        let pool = self.pool().await?;
        let documents = select(&pool.reader, collection, query, options).await?;
        Ok(match &options.projection {
            Some(fields) => documents.iter().map(|d| project(d, fields)).collect(),
            None => documents,
        })
    }

    async fn find_one(
        &self,
        collection: &str,
        query: &Document,
    ) -> Result<Option<Document>, RepositoryError> {
        let pool = self.pool().await?;
        let first = FindOptions::default().limit(1);
        Ok(select(&pool.reader, collection, query, &first).await?.into_iter().next())
    }

    async fn insert_one(
        &self,
        collection: &str,
        mut document: Document,
    ) -> Result<String, RepositoryError> {
        let pool = self.pool().await?;
        let id = assign_id(&mut document)?;
        insert_document(&pool.writer, collection, &id, &document).await?;
        Ok(id)
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<Vec<String>, RepositoryError> {
        let pool = self.pool().await?;
        let mut tx = pool.writer.begin().await.map_err(query_error)?;
        let mut ids = Vec::with_capacity(documents.len());
        for mut document in documents {
            let id = assign_id(&mut document)?;
            insert_document(&mut *tx, collection, &id, &document).await?;
            ids.push(id);
        }
        tx.commit().await.map_err(query_error)?;
        Ok(ids)
    }

    async fn update_many(
        &self,
        collection: &str,
        query: &Document,
        patch: &Document,
    ) -> Result<u64, RepositoryError> {
        let pool = self.pool().await?;
        let mut tx = pool.writer.begin().await.map_err(query_error)?;
        let documents = load(&mut *tx, collection, query).await?;
        let updated = documents.len() as u64;
        for mut document in documents {
            merge_patch(&mut document, patch);
            replace_document(&mut *tx, collection, &document).await?;
        }
        tx.commit().await.map_err(query_error)?;
        Ok(updated)
    }

    async fn upsert_one(
        &self,
        collection: &str,
        query: &Document,
        patch: &Document,
    ) -> Result<(), RepositoryError> {
        let pool = self.pool().await?;
        let mut tx = pool.writer.begin().await.map_err(query_error)?;
        match load(&mut *tx, collection, query).await?.into_iter().next() {
            Some(mut document) => {
                merge_patch(&mut document, patch);
                replace_document(&mut *tx, collection, &document).await?;
            }
            None => {
                let mut document = document_from_query(query);
                merge_patch(&mut document, patch);
                let id = assign_id(&mut document)?;
                insert_document(&mut *tx, collection, &id, &document).await?;
            }
        }
        tx.commit().await.map_err(query_error)?;
        Ok(())
    }

    async fn delete(&self, collection: &str, query: &Document) -> Result<u64, RepositoryError> {
        let pool = self.pool().await?;
        let mut tx = pool.writer.begin().await.map_err(query_error)?;
        let documents = load(&mut *tx, collection, query).await?;
        for document in &documents {
            sqlx::query("DELETE FROM memory_documents WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(document_id(document)?)
                .execute(&mut *tx)
                .await
                .map_err(query_error)?;
        }
        tx.commit().await.map_err(query_error)?;
        Ok(documents.len() as u64)
    }
}
