//! Document Store
//!
//! The flat backing store the hierarchy is layered on: named collections of
//! schemaless documents, each with a store-assigned fixed-width id.

pub mod memory;
pub mod persistence;

pub use memory::MemoryStore;
pub use persistence::SledDocumentStore;

use crate::error::{ApiError, StorageError};
use crate::types::{DocId, ID_FIELD};
use crate::value::{Document, Fields, Value};
use std::collections::BTreeSet;

/// Document filter
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document
    All,
    /// Matches the document with this id
    Id(DocId),
    /// Field equals value
    Eq {
        field: String,
        value: serde_json::Value,
    },
    /// String field starts with a literal prefix
    Prefix { field: String, prefix: String },
    /// String field matches an unanchored regular expression
    Regex { field: String, pattern: String },
    /// All sub-filters match
    And(Vec<Filter>),
}

impl Filter {
    pub fn id(id: impl Into<DocId>) -> Self {
        Filter::Id(id.into())
    }

    pub fn eq(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Filter::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn prefix(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Filter::Prefix {
            field: field.into(),
            prefix: prefix.into(),
        }
    }

    pub fn regex(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Filter::Regex {
            field: field.into(),
            pattern: pattern.into(),
        }
    }

    /// Build a filter from a query document.
    ///
    /// Each key becomes an equality test, `_id` an id test, and a
    /// `{"$regex": pattern}` value a regex test. An empty document matches all.
    pub fn from_query(query: Value) -> Result<Self, ApiError> {
        let fields = query.into_fields()?;
        let mut filters = Vec::with_capacity(fields.len());
        for (field, value) in fields {
            let filter = match value {
                serde_json::Value::String(id) if field == ID_FIELD => Filter::Id(id),
                serde_json::Value::Object(ref op) if op.contains_key("$regex") => {
                    match op.get("$regex") {
                        Some(serde_json::Value::String(pattern)) if op.len() == 1 => {
                            Filter::regex(field, pattern.clone())
                        }
                        _ => {
                            return Err(ApiError::InvalidValue(format!(
                                "unsupported operator on field {}",
                                field
                            )))
                        }
                    }
                }
                value => Filter::Eq { field, value },
            };
            filters.push(filter);
        }
        Ok(match filters.len() {
            0 => Filter::All,
            1 => filters.remove(0),
            _ => Filter::And(filters),
        })
    }

    /// Compile into a reusable matcher
    pub fn compile(&self) -> Result<Matcher, StorageError> {
        let compiled = match self {
            Filter::All => Compiled::All,
            Filter::Id(id) => Compiled::Id(id.clone()),
            Filter::Eq { field, value } if field == ID_FIELD => match value {
                serde_json::Value::String(id) => Compiled::Id(id.clone()),
                _ => Compiled::Never,
            },
            Filter::Eq { field, value } => Compiled::Eq(field.clone(), value.clone()),
            Filter::Prefix { field, prefix } => Compiled::Prefix(field.clone(), prefix.clone()),
            Filter::Regex { field, pattern } => {
                let regex = regex::Regex::new(pattern).map_err(|e| {
                    StorageError::InvalidFilter(format!("bad pattern {:?}: {}", pattern, e))
                })?;
                Compiled::Regex(field.clone(), regex)
            }
            Filter::And(filters) => Compiled::And(
                filters
                    .iter()
                    .map(|f| f.compile().map(|m| m.0))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
        };
        Ok(Matcher(compiled))
    }
}

/// A compiled `Filter`
#[derive(Debug, Clone)]
pub struct Matcher(Compiled);

#[derive(Debug, Clone)]
enum Compiled {
    All,
    Never,
    Id(DocId),
    Eq(String, serde_json::Value),
    Prefix(String, String),
    Regex(String, regex::Regex),
    And(Vec<Compiled>),
}

impl Matcher {
    pub fn matches(&self, id: &str, fields: &Fields) -> bool {
        self.0.matches(id, fields)
    }

    pub fn matches_document(&self, document: &Document) -> bool {
        self.0.matches(&document.id, &document.fields)
    }

    /// Exact id this matcher is restricted to, if any
    pub fn exact_id(&self) -> Option<&str> {
        match &self.0 {
            Compiled::Id(id) => Some(id),
            _ => None,
        }
    }
}

impl Compiled {
    fn matches(&self, id: &str, fields: &Fields) -> bool {
        match self {
            Compiled::All => true,
            Compiled::Never => false,
            Compiled::Id(want) => want == id,
            Compiled::Eq(field, value) => fields.get(field) == Some(value),
            Compiled::Prefix(field, prefix) => {
                string_field(id, fields, field).is_some_and(|s| s.starts_with(prefix.as_str()))
            }
            Compiled::Regex(field, regex) => {
                string_field(id, fields, field).is_some_and(|s| regex.is_match(s))
            }
            Compiled::And(all) => all.iter().all(|m| m.matches(id, fields)),
        }
    }
}

fn string_field<'a>(id: &'a str, fields: &'a Fields, field: &str) -> Option<&'a str> {
    if field == ID_FIELD {
        return Some(id);
    }
    fields.get(field).and_then(|v| v.as_str())
}

/// Document store adapter interface
///
/// Reads against a missing collection see no documents. Writes into a missing
/// collection fail with `CollectionNotFound`, except `update_set` and `remove`
/// which report that nothing matched.
pub trait DocumentStore: Send + Sync {
    /// Width in characters of every id this store generates
    fn id_width(&self) -> usize;

    fn collection_exists(&self, name: &str) -> Result<bool, StorageError>;
    fn list_collections(&self) -> Result<BTreeSet<String>, StorageError>;

    /// Fails with `CollectionExists` if the collection is already present
    fn create_collection(&self, name: &str) -> Result<(), StorageError>;

    /// Fails with `CollectionNotFound` if the collection is absent
    fn drop_collection(&self, name: &str) -> Result<(), StorageError>;

    /// Insert a document and return its generated id. An `_id` key in
    /// `fields` is discarded.
    fn insert(&self, collection: &str, fields: Fields) -> Result<DocId, StorageError>;

    fn find(
        &self,
        collection: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StorageError>;

    /// Merge `fields` into the document with `id`. Returns whether it existed.
    fn update_set(&self, collection: &str, id: &str, fields: Fields) -> Result<bool, StorageError>;

    /// Remove the document with `id`. Returns whether it existed.
    fn remove(&self, collection: &str, id: &str) -> Result<bool, StorageError>;

    fn count_matching(
        &self,
        collection: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<usize, StorageError> {
        Ok(self.find(collection, filter, limit)?.len())
    }

    /// Distinct string values of `field` over documents matching `filter`
    fn distinct_values(
        &self,
        collection: &str,
        field: &str,
        filter: &Filter,
    ) -> Result<BTreeSet<String>, StorageError> {
        Ok(self
            .find(collection, filter, None)?
            .into_iter()
            .filter_map(|doc| {
                if field == ID_FIELD {
                    return Some(doc.id);
                }
                doc.fields.get(field).and_then(|v| v.as_str()).map(str::to_string)
            })
            .collect())
    }

    /// Flush buffered writes. Default implementation is a no-op.
    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Merge `changes` into `target`, overwriting only the supplied keys
pub(crate) fn merge_set(target: &mut Fields, changes: Fields) {
    for (key, value) in changes {
        if key == ID_FIELD {
            continue;
        }
        target.insert(key, value);
    }
}
