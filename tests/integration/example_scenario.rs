use branchdb::error::ApiError;
use branchdb::types::ROOT_COLLECTION;
use serde_json::json;

use crate::integration::support::{memory_branch, sled_branch};
use branchdb::branch::Branch;

fn run_scenario(branch: &Branch) {
    let x = branch.create_object(r#"{"Name":"A"}"#, "/").unwrap();
    let child = branch.create_child(&x, "/").unwrap();
    assert_eq!(child, format!("/{}", x));

    let y = branch.create_object(json!({"Name": "B"}), &child).unwrap();
    let read = branch.read_object(&y, &child).unwrap();
    assert_eq!(read.fields.get("Name"), Some(&json!("B")));
    assert_eq!(read.fields.len(), 1);

    // root now has a descendant path
    assert!(branch.is_ancestor(ROOT_COLLECTION, "/").unwrap());
    assert!(branch.has_child(&x, "/").unwrap());

    let err = branch.delete_child(&x, "/").unwrap_err();
    assert!(matches!(err, ApiError::HasDescendants(_)));
    let err = branch.delete_object(&x, "/").unwrap_err();
    assert!(matches!(err, ApiError::HasDescendants(_)));

    branch.delete_object(&y, &child).unwrap();
    branch.delete_child(&x, "/").unwrap();
    assert!(!branch.has_child(&x, "/").unwrap());
    assert!(matches!(
        branch.resolve(&child).unwrap_err(),
        ApiError::NotFound(_)
    ));

    branch.delete_object(&x, "/").unwrap();
    assert!(matches!(
        branch.read_object(&x, "/").unwrap_err(),
        ApiError::NotFound(_)
    ));
}

#[test]
fn example_scenario_on_memory_store() {
    run_scenario(&memory_branch());
}

#[test]
fn example_scenario_with_cache_enabled() {
    let branch = memory_branch();
    branch.cache_enable().unwrap();
    run_scenario(&branch);
}

#[test]
fn example_scenario_on_sled_store() {
    let (_temp_dir, branch) = sled_branch();
    run_scenario(&branch);
}

#[test]
fn grandchild_makes_child_an_ancestor() {
    let branch = memory_branch();
    let x = branch.create_object(json!({"Name": "A"}), "/").unwrap();
    let x_path = branch.create_child(&x, "/").unwrap();
    assert!(!branch.is_ancestor(&x, "/").unwrap());

    let y = branch.create_object(json!({"Name": "B"}), &x_path).unwrap();
    let y_path = branch.create_child(&y, &x_path).unwrap();
    assert!(branch.is_ancestor(&x, "/").unwrap());
    assert!(!branch.is_ancestor(&y, &x_path).unwrap());

    // Node ids address their own entry regardless of the context path
    let x_node = branch.get_child(&x, "/").unwrap().unwrap();
    assert!(branch.is_ancestor(&x_node, "/anywhere").unwrap());
    assert_eq!(branch.get_path(&x_node).unwrap(), x_path);
    assert_eq!(branch.get_parent(&y_path).unwrap(), y);

    let err = branch.delete_child(&x, "/").unwrap_err();
    assert!(matches!(err, ApiError::HasDescendants(_)));
    branch.delete_child(&y, &x_path).unwrap();
    branch.delete_object(&y, &x_path).unwrap();
    branch.delete_child(&x, "/").unwrap();
    assert!(!branch.is_ancestor(ROOT_COLLECTION, "/").unwrap());
}

#[test]
fn reserved_nodes_are_protected() {
    let branch = memory_branch();
    let x = branch.create_object(json!({"k": 1}), "/").unwrap();
    let x_path = branch.create_child(&x, "/").unwrap();
    let node = branch.get_child(&x, "/").unwrap().unwrap();

    assert!(matches!(
        branch.create_object(json!({"path": "/bogus"}), "index"),
        Err(ApiError::PermissionDenied(_))
    ));
    assert!(matches!(
        branch.update_object(&node, json!({"path": "/moved"}), "index"),
        Err(ApiError::PermissionDenied(_))
    ));
    assert!(matches!(
        branch.search_object(&branchdb::Filter::All, "index"),
        Err(ApiError::PermissionDenied(_))
    ));
    assert!(matches!(
        branch.delete_node(ROOT_COLLECTION),
        Err(ApiError::PermissionDenied(_))
    ));
    assert!(matches!(
        branch.delete_node("index"),
        Err(ApiError::PermissionDenied(_))
    ));

    let entry = branch.read_object(&node, "index").unwrap();
    assert_eq!(entry.fields.get("path"), Some(&json!(x_path)));
    assert!(branch
        .object_exists(&branchdb::Filter::eq("path", x_path.clone()), "index")
        .unwrap());

    // Deleting through the index removes the node itself
    branch.delete_object(&node, "index").unwrap();
    assert!(!branch.has_child(&x, "/").unwrap());
    assert!(!branch.collection_exists(&node).unwrap());
    assert!(branch.collection_exists(ROOT_COLLECTION).unwrap());
    assert!(branch.collection_exists("index").unwrap());
}

#[test]
fn update_merges_fields() {
    let branch = memory_branch();
    let id = branch
        .create_object(json!({"Name": "A", "Age": 3}), "/")
        .unwrap();
    branch
        .update_object(&id, r#"{"Age": 4, "Tag": "x"}"#, "/")
        .unwrap();
    let doc = branch.read_object(&id, "/").unwrap();
    assert_eq!(
        doc.to_json(),
        json!({"_id": id, "Name": "A", "Age": 4, "Tag": "x"})
    );

    assert!(matches!(
        branch.update_object("000000000000000000000000", json!({"a": 1}), "/"),
        Err(ApiError::NotFound(_))
    ));
    assert!(matches!(
        branch.create_object("not json", "/"),
        Err(ApiError::InvalidValue(_))
    ));
    assert!(matches!(
        branch.create_object("[1, 2]", "/"),
        Err(ApiError::InvalidValue(_))
    ));
}

#[test]
fn children_of_missing_paths_are_rejected() {
    let branch = memory_branch();
    let x = branch.create_object(json!({"k": 1}), "/").unwrap();
    assert!(matches!(
        branch.create_child(&x, "/nowhere"),
        Err(ApiError::NotFound(_))
    ));
    assert!(matches!(
        branch.create_child("short", "/"),
        Err(ApiError::InvalidValue(_))
    ));
    assert!(matches!(
        branch.create_child(&x, "index"),
        Err(ApiError::PermissionDenied(_))
    ));
    assert!(matches!(
        branch.delete_child(&x, "/"),
        Err(ApiError::NotFound(_))
    ));
    assert!(matches!(
        branch.get_children(&x, "/"),
        Err(ApiError::NotFound(_))
    ));
    assert_eq!(branch.get_child(&x, "/").unwrap(), None);
}
