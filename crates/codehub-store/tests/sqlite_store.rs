use codehub_core::{
    CategoryStore, Dashboard, Error, FilterMode, RepositoryPayload, RepositoryStore, SortBy,
    ViewStore,
};
use codehub_store::SqliteStore;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

const ALICE: &str = "alice";
const BOB: &str = "bob";

fn payload(id: u64, full_name: &str, stars: u64) -> RepositoryPayload {
    let (owner, name) = full_name.split_once('/').unwrap();
    RepositoryPayload::from_value(json!({
        "id": id,
        "name": name,
        "full_name": full_name,
        "owner": { "login": owner },
        "html_url": format!("https://github.com/{}", full_name),
        "stargazers_count": stars,
        "forks_count": stars / 10,
        "language": "Rust",
    }))
    .unwrap()
}

fn ids<S: AsRef<str>>(ids: &[S]) -> BTreeSet<String> {
    ids.iter().map(|s| s.as_ref().to_string()).collect()
}

fn names(repos: &[codehub_core::Repository]) -> Vec<String> {
    repos.iter().map(|r| r.full_name()).collect()
}

#[test]
fn test_category_crud() {
    let store = SqliteStore::open_in_memory().unwrap();

    let infra = store.create_category(ALICE, "  infra ", Some("#ff0000")).unwrap();
    assert_eq!(infra.name, "infra");
    assert!(infra.id.starts_with("cat_"));

    let err = store.create_category(ALICE, "infra", None).unwrap_err();
    assert!(matches!(err, Error::Duplicate { .. }));
    let err = store.create_category(ALICE, "   ", None).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let ml = store.create_category(ALICE, "ml", None).unwrap();
    let err = store
        .update_category(ALICE, &ml.id, Some("infra"), None)
        .unwrap_err();
    assert!(matches!(err, Error::Duplicate { .. }));

    let renamed = store
        .update_category(ALICE, &ml.id, Some("machine learning"), Some("#00ff00"))
        .unwrap();
    assert_eq!(renamed.name, "machine learning");
    assert_eq!(store.get_category(ALICE, &ml.id).unwrap(), renamed);

    let listed: Vec<String> = store
        .list_categories(ALICE)
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(listed, vec!["infra", "machine learning"]);
}

#[test]
fn test_unknown_id_is_not_found_even_when_name_is_taken() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.create_category(ALICE, "infra", None).unwrap();
    store
        .create_view(ALICE, "mine", &BTreeSet::new(), FilterMode::Uncategorized)
        .unwrap();

    let err = store
        .update_category(ALICE, "cat_missing", Some("infra"), None)
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
    let err = store.rename_view(ALICE, "view_missing", "mine").unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[test]
fn test_delete_category_cascades_to_repositories() {
    let store = SqliteStore::open_in_memory().unwrap();
    let a = store.create_category(ALICE, "infra", None).unwrap();
    let b = store.create_category(ALICE, "ml", None).unwrap();

    store
        .save_repository(ALICE, payload(1, "acme/r1", 10), &ids(&[&a.id]))
        .unwrap();
    store
        .save_repository(ALICE, payload(2, "acme/r2", 20), &ids(&[&a.id, &b.id]))
        .unwrap();

    store.delete_category(ALICE, &a.id).unwrap();

    let repos = store.list_repositories(ALICE).unwrap();
    assert!(repos.iter().all(|r| !r.category_ids.contains(&a.id)));
    assert!(repos[0].category_ids.is_empty());
    assert_eq!(repos[1].category_ids, ids(&[&b.id]));

    let err = store.delete_category(ALICE, &a.id).unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[test]
fn test_duplicate_save_leaves_store_unchanged() {
    let store = SqliteStore::open_in_memory().unwrap();
    let a = store.create_category(ALICE, "infra", None).unwrap();
    let first = store
        .save_repository(ALICE, payload(7, "acme/tool", 5), &ids(&[&a.id]))
        .unwrap();

    let err = store
        .save_repository(ALICE, payload(7, "acme/tool-renamed", 99), &BTreeSet::new())
        .unwrap_err();
    assert!(matches!(err, Error::Duplicate { .. }));

    let repos = store.list_repositories(ALICE).unwrap();
    assert_eq!(repos.len(), 1);
    assert_eq!(repos[0], first);
}

#[test]
fn test_unknown_categories_are_rejected() {
    let store = SqliteStore::open_in_memory().unwrap();
    let a = store.create_category(ALICE, "infra", None).unwrap();

    let err = store
        .save_repository(ALICE, payload(1, "acme/r1", 1), &ids(&[a.id.as_str(), "cat_missing"]))
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(store.list_repositories(ALICE).unwrap().is_empty());

    store
        .save_repository(ALICE, payload(1, "acme/r1", 1), &BTreeSet::new())
        .unwrap();
    let err = store
        .add_categories(ALICE, "1", &ids(&["cat_missing"]))
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = store.add_categories(ALICE, "404", &ids(&[&a.id])).unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[test]
fn test_tagging_is_set_like() {
    let store = SqliteStore::open_in_memory().unwrap();
    let a = store.create_category(ALICE, "infra", None).unwrap();
    let b = store.create_category(ALICE, "ml", None).unwrap();
    store
        .save_repository(ALICE, payload(1, "acme/r1", 1), &ids(&[&a.id]))
        .unwrap();

    let repo = store.add_categories(ALICE, "1", &ids(&[&a.id, &b.id])).unwrap();
    assert_eq!(repo.category_ids, ids(&[&a.id, &b.id]));

    let repo = store.remove_categories(ALICE, "1", &ids(&[&a.id])).unwrap();
    assert_eq!(repo.category_ids, ids(&[&b.id]));
    let repo = store.remove_categories(ALICE, "1", &ids(&[&a.id])).unwrap();
    assert_eq!(repo.category_ids, ids(&[&b.id]));
}

#[test]
fn test_remove_repository_returns_record() {
    let store = SqliteStore::open_in_memory().unwrap();
    let a = store.create_category(ALICE, "infra", None).unwrap();
    store
        .save_repository(ALICE, payload(1, "acme/r1", 1), &ids(&[&a.id]))
        .unwrap();

    let removed = store.remove_repository(ALICE, "1").unwrap();
    assert_eq!(removed.category_ids, ids(&[&a.id]));
    assert_eq!(removed.metadata.stars(), 1);

    assert!(matches!(
        store.get_repository(ALICE, "1").unwrap_err(),
        Error::NotFound { .. }
    ));
    assert!(matches!(
        store.remove_repository(ALICE, "1").unwrap_err(),
        Error::NotFound { .. }
    ));
}

#[test]
fn test_users_are_isolated() {
    let store = SqliteStore::open_in_memory().unwrap();
    let a = store.create_category(ALICE, "infra", None).unwrap();
    // Same name is fine in another partition
    let b = store.create_category(BOB, "infra", None).unwrap();

    store
        .save_repository(ALICE, payload(1, "acme/r1", 1), &ids(&[&a.id]))
        .unwrap();
    store
        .save_repository(BOB, payload(1, "acme/r1", 1), &ids(&[&b.id]))
        .unwrap();

    // Alice's category id means nothing to Bob
    let err = store.add_categories(BOB, "1", &ids(&[&a.id])).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(matches!(
        store.get_category(BOB, &a.id).unwrap_err(),
        Error::NotFound { .. }
    ));

    store.delete_category(ALICE, &a.id).unwrap();
    assert_eq!(
        store.get_repository(BOB, "1").unwrap().category_ids,
        ids(&[&b.id])
    );
}

#[test]
fn test_view_lifecycle() {
    let store = SqliteStore::open_in_memory().unwrap();
    let a = store.create_category(ALICE, "infra", None).unwrap();

    let view = store
        .create_view(ALICE, "Infra", &ids(&[&a.id]), FilterMode::All)
        .unwrap();
    assert!(view.id.starts_with("view_"));
    assert_eq!(store.get_view(ALICE, &view.id).unwrap(), view);

    let err = store
        .create_view(ALICE, "Infra", &ids(&[&a.id]), FilterMode::Any)
        .unwrap_err();
    assert!(matches!(err, Error::Duplicate { .. }));
    let err = store
        .create_view(ALICE, "Empty", &BTreeSet::new(), FilterMode::Any)
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let bare = store
        .create_view(ALICE, "Untagged", &ids(&[&a.id]), FilterMode::Uncategorized)
        .unwrap();
    assert!(bare.category_ids.is_empty());

    let renamed = store.rename_view(ALICE, &view.id, "Platform").unwrap();
    assert_eq!(renamed.name, "Platform");
    let err = store.rename_view(ALICE, &bare.id, "Platform").unwrap_err();
    assert!(matches!(err, Error::Duplicate { .. }));

    let listed: Vec<String> = store
        .list_views(ALICE)
        .unwrap()
        .into_iter()
        .map(|v| v.name)
        .collect();
    assert_eq!(listed, vec!["Platform", "Untagged"]);

    store.delete_view(ALICE, &view.id).unwrap();
    assert!(matches!(
        store.delete_view(ALICE, &view.id).unwrap_err(),
        Error::NotFound { .. }
    ));
}

#[test]
fn test_dashboard_filters_and_prunes_views() {
    let mut dash = Dashboard::new(SqliteStore::open_in_memory().unwrap(), ALICE);
    let a = dash.create_category("infra", None).unwrap();
    let b = dash.create_category("ml", None).unwrap();

    dash.save_repository(payload(1, "acme/r1", 30), &ids(&[&a.id]))
        .unwrap();
    dash.save_repository(payload(2, "acme/r2", 20), &ids(&[&a.id, &b.id]))
        .unwrap();
    dash.save_repository(payload(3, "acme/r3", 10), &BTreeSet::new())
        .unwrap();

    let all = dash
        .filter(&ids(&[&a.id, &b.id]), FilterMode::All, SortBy::Saved)
        .unwrap();
    assert_eq!(names(&all), vec!["acme/r2"]);
    let any = dash
        .filter(&ids(&[&a.id, &b.id]), FilterMode::Any, SortBy::Saved)
        .unwrap();
    assert_eq!(names(&any), vec!["acme/r1", "acme/r2"]);
    let none = dash
        .filter(&BTreeSet::new(), FilterMode::Uncategorized, SortBy::Saved)
        .unwrap();
    assert_eq!(names(&none), vec!["acme/r3"]);

    let view = dash
        .create_view("Both", &ids(&[&a.id, &b.id]), FilterMode::Any)
        .unwrap();
    dash.delete_category(&b.id).unwrap();

    let applied = dash.apply_saved_view(&view.id, SortBy::Stars).unwrap();
    assert_eq!(names(&applied), vec!["acme/r1", "acme/r2"]);
    // The pruned selection was written back
    assert_eq!(dash.get_view(&view.id).unwrap().category_ids, ids(&[&a.id]));

    dash.delete_category(&a.id).unwrap();
    let err = dash.apply_saved_view(&view.id, SortBy::Stars).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let removed = dash.remove_repository("3").unwrap();
    assert_eq!(removed.name, "r3");
    let restored = dash.undo_remove().unwrap();
    assert_eq!(restored.id, "3");
}

#[test]
fn test_data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("dashboard.db");

    let (category_id, view_id) = {
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
        let a = store.create_category(ALICE, "infra", None).unwrap();
        store
            .save_repository(ALICE, payload(42, "acme/keep", 5), &ids(&[&a.id]))
            .unwrap();
        let view = store
            .create_view(ALICE, "Keep", &ids(&[&a.id]), FilterMode::All)
            .unwrap();
        (a.id, view.id)
    };

    let store = SqliteStore::open(&path).unwrap();
    let repo = store.get_repository(ALICE, "42").unwrap();
    assert_eq!(repo.full_name(), "acme/keep");
    assert_eq!(repo.url, "https://github.com/acme/keep");
    assert_eq!(repo.category_ids, ids(&[&category_id]));
    assert_eq!(repo.metadata.language(), Some("Rust"));

    let view = store.get_view(ALICE, &view_id).unwrap();
    assert_eq!(view.mode, FilterMode::All);
    assert_eq!(view.category_ids, ids(&[&category_id]));
}

/// Delete a category on `deleter` while `tagger` keeps adding it to repositories
fn race_delete_against_tagging(deleter: Arc<SqliteStore>, tagger: Arc<SqliteStore>) {
    let cat = deleter.create_category(ALICE, "hot", None).unwrap();
    for i in 0..50 {
        deleter
            .save_repository(ALICE, payload(i, &format!("acme/r{}", i), 1), &BTreeSet::new())
            .unwrap();
    }

    let handle = {
        let selection = ids(&[&cat.id]);
        thread::spawn(move || {
            for i in 0..50 {
                match tagger.add_categories(ALICE, &i.to_string(), &selection) {
                    Ok(_) | Err(Error::Validation(_)) => {}
                    Err(other) => panic!("unexpected error: {other}"),
                }
            }
        })
    };

    deleter.delete_category(ALICE, &cat.id).unwrap();
    handle.join().unwrap();

    let repos = deleter.list_repositories(ALICE).unwrap();
    assert_eq!(repos.len(), 50);
    assert!(repos.iter().all(|r| r.category_ids.is_empty()));
    assert!(matches!(
        deleter.get_category(ALICE, &cat.id).unwrap_err(),
        Error::NotFound { .. }
    ));
}

#[test]
fn test_cascade_races_with_concurrent_tagging() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    race_delete_against_tagging(Arc::clone(&store), store);
}

#[test]
fn test_cascade_races_across_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");
    let deleter = Arc::new(SqliteStore::open(&path).unwrap());
    let tagger = Arc::new(SqliteStore::open(&path).unwrap());

    race_delete_against_tagging(deleter, Arc::clone(&tagger));

    // The second handle sees the same end state
    let repos = tagger.list_repositories(ALICE).unwrap();
    assert!(repos.iter().all(|r| r.category_ids.is_empty()));
}
