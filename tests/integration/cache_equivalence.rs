use branchdb::branch::Branch;
use branchdb::cache::CacheState;
use branchdb::error::ApiError;
use branchdb::store::{DocumentStore, Filter, MemoryStore};
use serde_json::json;
use std::sync::Arc;

/// Two sessions over one store: mutations go through the cached session, so
/// its mirror is only kept current by write-through.
fn paired_sessions() -> (Branch, Branch) {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let cached = Branch::connect(store.clone()).unwrap();
    cached.cache_enable().unwrap();
    let uncached = Branch::connect(store).unwrap();
    (cached, uncached)
}

fn assert_equivalent(cached: &Branch, uncached: &Branch, paths: &[String]) {
    assert_eq!(cached.cache_status(), CacheState::Enabled);
    assert_eq!(uncached.cache_status(), CacheState::Disabled);
    assert_eq!(cached.collections().unwrap(), uncached.collections().unwrap());
    assert_eq!(
        cached.index().entries().unwrap(),
        uncached.index().entries().unwrap()
    );
    for path in paths {
        let Ok(_) = uncached.resolve(path) else {
            assert!(matches!(cached.resolve(path), Err(ApiError::NotFound(_))));
            continue;
        };
        assert_eq!(
            cached.get_structure(path).unwrap(),
            uncached.get_structure(path).unwrap()
        );
        let prefix = Filter::prefix("path", path.clone());
        assert_eq!(
            cached.object_exists(&prefix, "index").unwrap(),
            uncached.object_exists(&prefix, "index").unwrap()
        );
        let exact = Filter::eq("path", path.clone());
        assert_eq!(
            cached.object_exists(&exact, "index").unwrap(),
            uncached.object_exists(&exact, "index").unwrap()
        );
        let named = Filter::eq("Name", "B");
        assert_eq!(
            cached.search_object(&named, path).unwrap(),
            uncached.search_object(&named, path).unwrap()
        );
    }
}

#[test]
fn write_through_matches_the_store() {
    let (cached, uncached) = paired_sessions();
    let mut paths = vec!["/".to_string()];

    let a = cached.create_object(json!({"Name": "A"}), "/").unwrap();
    let b = cached.create_object(json!({"Name": "B"}), "/").unwrap();
    assert_equivalent(&cached, &uncached, &paths);

    let a_path = cached.create_child(&a, "/").unwrap();
    let b_path = cached.create_child(&b, "/").unwrap();
    paths.push(a_path.clone());
    paths.push(b_path.clone());
    assert_equivalent(&cached, &uncached, &paths);

    let c = cached.create_object(json!({"Name": "B"}), &a_path).unwrap();
    let c_path = cached.create_child(&c, &a_path).unwrap();
    paths.push(c_path.clone());
    assert_equivalent(&cached, &uncached, &paths);

    let node = cached.get_child(&a, "/").unwrap().unwrap();
    let regex = Filter::regex("path", format!("^{}/", a_path));
    assert!(cached.object_exists(&regex, "index").unwrap());
    assert!(cached.object_exists(&Filter::id(node.clone()), "index").unwrap());
    assert_eq!(
        cached.object_exists(&regex, "index").unwrap(),
        uncached.object_exists(&regex, "index").unwrap()
    );

    cached.delete_child(&c, &a_path).unwrap();
    assert_equivalent(&cached, &uncached, &paths);

    cached.delete_object(&c, &a_path).unwrap();
    cached.delete_child(&a, "/").unwrap();
    assert!(matches!(
        cached.delete_object(&b, "/"),
        Err(ApiError::HasDescendants(_))
    ));
    assert_equivalent(&cached, &uncached, &paths);
    assert!(!cached.object_exists(&Filter::id(node), "index").unwrap());
}

#[test]
fn cache_state_transitions() {
    let branch = crate::integration::support::memory_branch();
    assert!(matches!(branch.cache_disable(), Err(ApiError::AlreadyDisabled)));
    assert!(matches!(branch.cache_update(), Err(ApiError::NotEnabled)));

    branch.cache_enable().unwrap();
    assert!(matches!(branch.cache_enable(), Err(ApiError::AlreadyEnabled)));
    branch.cache_update().unwrap();
    assert_eq!(branch.cache_status(), CacheState::Enabled);

    branch.cache_disable().unwrap();
    assert_eq!(branch.cache_status(), CacheState::Disabled);
}

#[test]
fn update_picks_up_changes_from_other_sessions() {
    let (cached, uncached) = paired_sessions();
    let a = uncached.create_object(json!({"Name": "A"}), "/").unwrap();
    let a_path = uncached.create_child(&a, "/").unwrap();

    // Mirror is stale until rebuilt
    assert!(!cached.has_child(&a, "/").unwrap());
    cached.cache_update().unwrap();
    assert!(cached.has_child(&a, "/").unwrap());
    assert_eq!(
        cached.get_structure("/").unwrap(),
        uncached.get_structure("/").unwrap()
    );
    assert_eq!(cached.resolve(&a_path).unwrap(), uncached.resolve(&a_path).unwrap());
}
