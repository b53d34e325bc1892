//! Structure Builder
//!
//! Rebuilds the nested tree shape below a path from the flat set of index
//! paths. Every segment is a fixed-width id, so all paths of one depth share
//! one length: paths are bucketed by length, buckets sorted ascending, and
//! each level keeps the paths of the next bucket that extend the current one.

use crate::types::{child_path, descendant_prefix};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// Nested tree: child segment to subtree, `None` at leaves
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Structure(BTreeMap<String, Option<Structure>>);

impl Structure {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, segment: &str) -> bool {
        self.0.contains_key(segment)
    }

    /// Subtree below `segment`; `None` if absent or a leaf
    pub fn get(&self, segment: &str) -> Option<&Structure> {
        self.0.get(segment).and_then(Option::as_ref)
    }

    pub fn children(&self) -> impl Iterator<Item = (&String, Option<&Structure>)> {
        self.0.iter().map(|(k, v)| (k, v.as_ref()))
    }

    /// Flatten back into absolute paths below `prefix`
    pub fn paths(&self, prefix: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_paths(prefix, &mut out);
        out
    }

    fn collect_paths(&self, prefix: &str, out: &mut BTreeSet<String>) {
        for (segment, subtree) in &self.0 {
            let path = child_path(prefix, segment);
            if let Some(subtree) = subtree {
                subtree.collect_paths(&path, out);
            }
            out.insert(path);
        }
    }

    /// Number of levels below the root of this structure
    pub fn depth(&self) -> usize {
        self.0
            .values()
            .map(|s| 1 + s.as_ref().map_or(0, Structure::depth))
            .max()
            .unwrap_or(0)
    }
}

pub struct StructureBuilder {
    width: usize,
}

impl StructureBuilder {
    /// `width` is the fixed identifier width of every path segment
    pub fn new(width: usize) -> Self {
        Self { width }
    }

    /// Build the structure below `root_path` from `paths`. Paths that do not
    /// lie strictly below `root_path` are ignored.
    pub fn build<I>(&self, root_path: &str, paths: I) -> Structure
    where
        I: IntoIterator<Item = String>,
    {
        let prefix = descendant_prefix(root_path);
        let mut buckets: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for path in paths {
            if path.len() > prefix.len() && path.starts_with(&prefix) {
                buckets.entry(path.len()).or_default().push(path);
            }
        }
        let levels: Vec<Vec<String>> = buckets.into_values().collect();
        self.level(&levels, &prefix)
    }

    fn level(&self, levels: &[Vec<String>], prefix: &str) -> Structure {
        let Some((current, deeper)) = levels.split_first() else {
            return Structure::default();
        };

        let mut tree = BTreeMap::new();
        for path in current.iter().filter(|p| p.starts_with(prefix)) {
            let Some(segment) = path
                .len()
                .checked_sub(self.width)
                .and_then(|start| path.get(start..))
            else {
                continue;
            };
            let subtree = if deeper.is_empty() {
                None
            } else {
                let nested = self.level(deeper, &descendant_prefix(path));
                (!nested.is_empty()).then_some(nested)
            };
            tree.insert(segment.to_string(), subtree);
        }
        Structure(tree)
    }
}
