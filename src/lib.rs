//! BranchDB: Hierarchical Namespace over a Flat Document Store
//!
//! Documents live in flat collections. A path index maps slash-separated
//! paths, built from document ids, onto child collections, so any document
//! can own a subtree of further documents. An optional in-memory mirror of
//! the index and collection list serves reads without touching the store.

pub mod branch;
pub mod cache;
pub mod config;
pub mod error;
pub mod index;
pub mod logging;
pub mod store;
pub mod structure;
pub mod tooling;
pub mod types;
pub mod value;

pub use branch::Branch;
pub use cache::CacheState;
pub use error::{ApiError, StorageError};
pub use store::{DocumentStore, Filter, MemoryStore, SledDocumentStore};
pub use structure::Structure;
pub use types::Node;
pub use value::{Document, Fields, Value};
