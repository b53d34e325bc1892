//! Core types for the hierarchical namespace.

/// DocId: store-assigned identifier of a document
pub type DocId = String;

/// NodeId: identifier of a hierarchy node. A non-root node's id is the id of
/// its index entry, and also the name of its collection.
pub type NodeId = String;

/// Collection holding the top-level documents
pub const ROOT_COLLECTION: &str = "root";

/// Collection holding one `{_id, path}` entry per non-root node
pub const INDEX_COLLECTION: &str = "index";

/// Path of the root node
pub const ROOT_PATH: &str = "/";

/// Reserved address of the index node
pub const INDEX_PATH: &str = "index";

pub const PATH_SEPARATOR: char = '/';

/// Field carrying the document id in filters and synthetic documents
pub const ID_FIELD: &str = "_id";

/// Field carrying the path of an index entry
pub const PATH_FIELD: &str = "path";

/// Width in characters of ids produced by `object_id`
pub const OBJECT_ID_WIDTH: usize = 24;

/// A resolved hierarchy node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Node {
    Root,
    Index,
    Collection(NodeId),
}

impl Node {
    /// Name of the backing collection
    pub fn collection(&self) -> &str {
        match self {
            Node::Root => ROOT_COLLECTION,
            Node::Index => INDEX_COLLECTION,
            Node::Collection(id) => id,
        }
    }

    pub fn from_collection(name: &str) -> Self {
        match name {
            ROOT_COLLECTION => Node::Root,
            INDEX_COLLECTION => Node::Index,
            other => Node::Collection(other.to_string()),
        }
    }

    /// `root` and `index` can never be dropped
    pub fn is_reserved(&self) -> bool {
        !matches!(self, Node::Collection(_))
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.collection())
    }
}

/// Normalize a caller-supplied path: empty means root, and a trailing
/// separator is dropped everywhere except on `/` itself.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches(PATH_SEPARATOR);
    if trimmed.is_empty() {
        return ROOT_PATH.to_string();
    }
    trimmed.to_string()
}

/// Path of `child` below `parent`
pub fn child_path(parent: &str, child: &str) -> String {
    let mut path = parent.to_string();
    if !path.ends_with(PATH_SEPARATOR) {
        path.push(PATH_SEPARATOR);
    }
    path.push_str(child);
    path
}

/// Prefix every descendant path of `path` starts with
pub fn descendant_prefix(path: &str) -> String {
    child_path(path, "")
}

/// Build a 12-byte object id (seconds timestamp + counter) as 24 hex chars.
pub fn object_id(seconds: u32, counter: u64) -> DocId {
    let mut bytes = [0u8; 12];
    bytes[..4].copy_from_slice(&seconds.to_be_bytes());
    bytes[4..].copy_from_slice(&counter.to_be_bytes());
    hex::encode(bytes)
}

/// Current UTC time in whole seconds, truncated to the 4 bytes of an object id
pub fn object_id_timestamp() -> u32 {
    chrono::Utc::now().timestamp() as u32
}

/// A valid child segment is exactly `width` bytes of visible ASCII without a
/// separator. Paths are bucketed and sliced by byte length.
pub fn is_valid_segment(segment: &str, width: usize) -> bool {
    segment.len() == width
        && segment
            .bytes()
            .all(|b| b.is_ascii_graphic() && b != PATH_SEPARATOR as u8)
}
