use branchdb::branch::Branch;
use branchdb::error::ApiError;
use branchdb::types::ROOT_PATH;
use branchdb::value::Fields;
use proptest::prelude::*;
use std::collections::BTreeSet;

use crate::integration::support::memory_branch;

#[derive(Debug, Clone)]
enum Op {
    /// Create a document in the node picked by index
    CreateObject(usize),
    /// Create the child of the document picked by index
    CreateChild(usize),
    /// Delete the child node picked by index
    DeleteChild(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => any::<usize>().prop_map(Op::CreateObject),
        3 => any::<usize>().prop_map(Op::CreateChild),
        1 => any::<usize>().prop_map(Op::DeleteChild),
    ]
}

/// Documents as (id, path of the node holding it)
struct Harness {
    branch: Branch,
    documents: Vec<(String, String)>,
}

impl Harness {
    fn new(cached: bool) -> Self {
        let branch = memory_branch();
        if cached {
            branch.cache_enable().unwrap();
        }
        Self {
            branch,
            documents: Vec::new(),
        }
    }

    fn node_paths(&self) -> Vec<String> {
        let mut paths = vec![ROOT_PATH.to_string()];
        paths.extend(self.index_paths());
        paths
    }

    fn index_paths(&self) -> BTreeSet<String> {
        self.branch
            .index()
            .entries()
            .unwrap()
            .into_iter()
            .map(|entry| entry.path)
            .collect()
    }

    fn apply(&mut self, op: &Op) {
        match op {
            Op::CreateObject(pick) => {
                let nodes = self.node_paths();
                let path = nodes[pick % nodes.len()].clone();
                let id = self
                    .branch
                    .create_object(serde_json::json!({"n": self.documents.len()}), &path)
                    .unwrap();
                self.documents.push((id, path));
            }
            Op::CreateChild(pick) => {
                if self.documents.is_empty() {
                    return;
                }
                let (id, path) = self.documents[pick % self.documents.len()].clone();
                let existed = self.branch.has_child(&id, &path).unwrap();
                match self.branch.create_child(&id, &path) {
                    Ok(child) => {
                        assert!(!existed);
                        assert!(self.index_paths().contains(&child));
                    }
                    Err(ApiError::AlreadyExists(_)) => assert!(existed),
                    Err(e) => panic!("unexpected error: {}", e),
                }
            }
            Op::DeleteChild(pick) => {
                let entries = self.branch.index().entries().unwrap();
                if entries.is_empty() {
                    return;
                }
                let entry = &entries[pick % entries.len()];
                let all = self.index_paths();
                let prefix = format!("{}/", entry.path);
                let has_paths = all.iter().any(|p| p.starts_with(&prefix));
                let has_docs = !self.branch.get_objects(&entry.path).unwrap().is_empty();
                match self.branch.delete_node(&entry.id) {
                    Ok(()) => {
                        assert!(!has_paths && !has_docs);
                        assert!(!self.index_paths().contains(&entry.path));
                    }
                    Err(ApiError::HasDescendants(_)) => assert!(has_paths || has_docs),
                    Err(e) => panic!("unexpected error: {}", e),
                }
            }
        }
    }

    fn check_invariants(&self) {
        let entries = self.branch.index().entries().unwrap();
        let paths = self.index_paths();
        assert_eq!(paths.len(), entries.len(), "index paths are unique");

        // Structure flattens back to exactly the index paths
        let structure = self.branch.get_structure("/").unwrap();
        assert_eq!(structure.paths("/"), paths);
        for entry in &entries {
            let prefix = format!("{}/", entry.path);
            let below: BTreeSet<String> = paths
                .iter()
                .filter(|p| p.starts_with(&prefix))
                .cloned()
                .collect();
            let subtree = self.branch.get_structure(&entry.path).unwrap();
            assert_eq!(subtree.paths(&entry.path), below);

            // Ancestry is exactly "some path extends mine"
            assert_eq!(
                self.branch.is_ancestor(&entry.id, "/").unwrap(),
                !below.is_empty()
            );
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn hierarchy_invariants_hold(ops in prop::collection::vec(op_strategy(), 1..40), cached in any::<bool>()) {
        let mut harness = Harness::new(cached);
        for op in &ops {
            harness.apply(op);
        }
        harness.check_invariants();
    }

    #[test]
    fn documents_round_trip(
        fields in prop::collection::btree_map("[a-zA-Z][a-zA-Z0-9]{0,8}", any::<i64>(), 0..8),
        label in "[ -~]{0,16}",
    ) {
        let branch = memory_branch();
        let mut value = Fields::new();
        for (key, n) in &fields {
            value.insert(key.clone(), serde_json::json!(n));
        }
        value.insert("label".to_string(), serde_json::json!(label));

        let id = branch.create_object(value.clone(), "/").unwrap();
        prop_assert_eq!(&branch.read_object(&id, "/").unwrap().fields, &value);

        // Same through the encoded form, one level down
        let child = branch.create_child(&id, "/").unwrap();
        let encoded = serde_json::to_string(&value).unwrap();
        let nested = branch.create_object(encoded.as_str(), &child).unwrap();
        prop_assert_eq!(&branch.read_object(&nested, &child).unwrap().fields, &value);
    }
}

#[test]
fn duplicate_child_is_rejected() {
    let branch = memory_branch();
    let id = branch.create_object(serde_json::json!({"k": 1}), "/").unwrap();
    branch.create_child(&id, "/").unwrap();
    assert!(matches!(
        branch.create_child(&id, "/"),
        Err(ApiError::AlreadyExists(_))
    ));
    // Trailing separator resolves to the same node
    let path = format!("/{}/", id);
    let nested = branch.create_object(serde_json::json!({"k": 2}), &path).unwrap();
    assert_eq!(branch.get_objects(&format!("/{}", id)).unwrap()[0].id, nested);
}

#[test]
fn sibling_prefix_is_not_ancestry() {
    let branch = memory_branch();
    let a = branch.create_object(serde_json::json!({"k": "a"}), "/").unwrap();
    let a_path = branch.create_child(&a, "/").unwrap();
    let b = branch.create_object(serde_json::json!({"k": "b"}), &a_path).unwrap();
    branch.create_child(&b, &a_path).unwrap();

    let c = branch.create_object(serde_json::json!({"k": "c"}), "/").unwrap();
    branch.create_child(&c, "/").unwrap();
    // "/a" extended by "/a/b" only; "/c" shares no separator-bounded prefix
    assert!(branch.is_ancestor(&a, "/").unwrap());
    assert!(!branch.is_ancestor(&c, "/").unwrap());
}
