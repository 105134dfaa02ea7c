//! Query-by-example helpers shared by in-process memory backends.
//!
//! A query is a [`Document`] of `path -> expected value` pairs. Paths may be
//! dotted to reach nested objects. A document matches when every pair
//! compares equal; an expected `null` also matches a missing field.

use std::cmp::Ordering;

use agentry_types::memory::{Document, ID_FIELD, SortSpec};
use agentry_types::paging::SortDirection;
use serde_json::Value;

/// Resolve a dotted path inside a document.
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = doc.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// True when `doc` satisfies every pair in `query`.
pub fn matches(doc: &Document, query: &Document) -> bool {
    query.iter().all(|(path, expected)| match lookup(doc, path) {
        Some(actual) => values_equal(actual, expected),
        None => expected.is_null(),
    })
}

/// JSON equality with numbers compared by value (`1` equals `1.0`).
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn type_rank(v: Option<&Value>) -> u8 {
    match v {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Bool(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

/// Total order over optional JSON values: missing/null, numbers, strings,
/// booleans, then arrays and objects by their serialized form.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x @ (Value::Array(_) | Value::Object(_))), Some(y))
            if type_rank(Some(x)) == type_rank(Some(y)) =>
        {
            x.to_string().cmp(&y.to_string())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Sort documents by `sort.field`, breaking ties on `_id` in the same direction.
pub fn sort_documents(docs: &mut [Document], sort: &SortSpec) {
    docs.sort_by(|a, b| {
        let ordering = compare_values(lookup(a, &sort.field), lookup(b, &sort.field))
            .then_with(|| compare_values(a.get(ID_FIELD), b.get(ID_FIELD)));
        match sort.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    });
}

/// Keep only the listed top-level (or dotted) fields, plus `_id`.
pub fn project(doc: &Document, fields: &[String]) -> Document {
    let mut out = Document::new();
    if let Some(id) = doc.get(ID_FIELD) {
        out.insert(ID_FIELD.to_string(), id.clone());
    }
    for field in fields {
        if let Some(value) = lookup(doc, field) {
            insert_path(&mut out, field, value.clone());
        }
    }
    out
}

/// Set a dotted path, creating intermediate objects as needed.
pub fn insert_path(doc: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = doc
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            if !entry.is_object() {
                *entry = Value::Object(Document::new());
            }
            if let Value::Object(inner) = entry {
                insert_path(inner, rest, value);
            }
        }
    }
}

/// Apply a JSON merge patch (RFC 7396): objects merge, `null` removes, anything
/// else replaces. `_id` is never changed.
pub fn merge_patch(target: &mut Document, patch: &Document) {
    for (key, value) in patch {
        if key == ID_FIELD {
            continue;
        }
        merge_value(target, key, value);
    }
}

fn merge_value(target: &mut Document, key: &str, value: &Value) {
    match value {
        Value::Null => {
            target.remove(key);
        }
        Value::Object(patch) => {
            let entry = target
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            if !entry.is_object() {
                *entry = Value::Object(Document::new());
            }
            if let Value::Object(inner) = entry {
                for (k, v) in patch {
                    merge_value(inner, k, v);
                }
            }
        }
        other => {
            target.insert(key.to_string(), other.clone());
        }
    }
}

/// Seed document for an upsert that matched nothing: the query's equality
/// pairs become fields.
pub fn document_from_query(query: &Document) -> Document {
    let mut doc = Document::new();
    for (path, value) in query {
        insert_path(&mut doc, path, value.clone());
    }
    doc
}
