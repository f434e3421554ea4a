//! End-to-end flush properties, driven through the in-memory session.

use deltaview_engine::{
    AttributeMapping, FetchGraphNode, FlushError, FusedCollectionIndexActions, FusedMapActions,
    StatementKind, UpdaterRegistry, ViewTypeMapping, ViewUpdater,
};
use deltaview_model::{AttributeValue, MapAction, RecordingMap, ScalarValue};
use deltaview_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

fn updater() -> ViewUpdater {
    ViewUpdater::new(post_mapping()).expect("post mapping is valid")
}

fn text(value: &str) -> AttributeValue {
    AttributeValue::Scalar(ScalarValue::Text(value.into()))
}

/// Property 1: for an unmutated view, the dirty flusher signals "nothing to
/// flush" and a flush issues no statements.
#[test]
fn noop_diff_is_idempotent() {
    let updater = updater();
    let author = loaded_author(1, "alice");
    let post = loaded_post(1, 1, "hello", &author);
    let mut session = MemorySession::new();
    seed_post(&mut session, &post);

    assert!(updater.dirty_flusher(&post).unwrap().is_none());
    let changed = updater.flush(&mut session, &post).unwrap();
    assert!(!changed);
    assert!(session.statements().is_empty());
}

/// Property 2: the compressed operations applied to a reference copy of the
/// original list reproduce the content and order of replaying the raw log.
#[test]
fn list_collapse_example_from_remove_and_add() {
    let author = loaded_author(1, "alice");
    let post = loaded_post_with_content(1, 1, "t", &author, &[], &["a", "b", "c"], &[]);
    {
        let mut guard = post.write();
        let comments = guard.list_mut(POST_COMMENTS).unwrap();
        comments.remove(1).unwrap();
        comments.insert(1, text("d")).unwrap();
    }
    let guard = post.read();
    let list = guard.get(POST_COMMENTS).unwrap().as_list().unwrap();
    let fused = FusedCollectionIndexActions::new(list.actions(), &|_| false);

    // A single replace of position 1, not a remove followed by an insert.
    assert!(fused.remove_ranges().is_empty());
    assert_eq!(fused.replaces().len(), 1);
    assert_eq!(fused.replaces()[0].index, 1);
    assert_eq!(fused.replaces()[0].old_value(), Some(&text("b")));

    let mut reference = vec![text("a"), text("b"), text("c")];
    fused.apply_to(&mut reference);
    assert_eq!(reference, vec![text("a"), text("d"), text("c")]);
}

proptest! {
    /// Property 2, generalized: arbitrary scripts of removes, sets, appends,
    /// and appended-region removes collapse to operations equivalent to the
    /// raw replay.
    #[test]
    fn list_collapse_matches_reference_replay(script in list_script_strategy()) {
        let (original, list) = run_list_script(&script);
        let fused = FusedCollectionIndexActions::new(list.actions(), &|_| false);
        let mut reference = original;
        fused.apply_to(&mut reference);
        prop_assert_eq!(reference, list.elements().to_vec());
    }

    /// Property 3, generalized: the fused map sets applied to the original
    /// content reproduce the raw replay.
    #[test]
    fn map_collapse_matches_reference_replay(
        ops in prop::collection::vec(
            (any::<bool>(), map_key_strategy(), 0i64..4),
            0..12,
        )
    ) {
        let mut map = RecordingMap::from_entries(vec![
            (ScalarValue::Text("k0".into()), AttributeValue::Scalar(ScalarValue::Integer(0))),
        ]);
        for (is_put, key, value) in &ops {
            if *is_put {
                map.put(key.clone(), AttributeValue::Scalar(ScalarValue::Integer(*value)));
            } else {
                map.remove(key);
            }
        }
        let fused = FusedMapActions::new(map.actions(), &|_| false);
        let mut reference: BTreeMap<ScalarValue, AttributeValue> = [(
            ScalarValue::Text("k0".into()),
            AttributeValue::Scalar(ScalarValue::Integer(0)),
        )]
        .into_iter()
        .collect();
        for key in fused.removed().keys() {
            reference.remove(key);
        }
        for (key, (_, new_value)) in fused.replaced() {
            reference.insert(key.clone(), new_value.clone());
        }
        for (key, value) in fused.added() {
            reference.insert(key.clone(), value.clone());
        }
        prop_assert_eq!(&reference, map.entries());
    }
}

/// Property 3: remove(k) then put(k, same value) nets to no operations.
#[test]
fn map_remove_then_put_same_value_is_empty() {
    let mut map = RecordingMap::from_entries(vec![
        (ScalarValue::Text("k1".into()), text("v1")),
        (ScalarValue::Text("k2".into()), text("v2")),
    ]);
    map.remove(&ScalarValue::Text("k1".into()));
    map.put(ScalarValue::Text("k1".into()), text("v1"));
    let actions: &[MapAction] = map.actions();
    let fused = FusedMapActions::new(actions, &|_| false);
    assert!(fused.is_empty());
}

/// Property 4: removing an element and re-adding the same identity at the
/// resulting position produces no operations at all.
#[test]
fn reinsertion_of_same_identity_cancels() {
    let author = loaded_author(1, "alice");
    let post = loaded_post_with_content(1, 1, "t", &author, &[], &["a", "b", "x"], &[]);
    {
        let mut guard = post.write();
        let comments = guard.list_mut(POST_COMMENTS).unwrap();
        comments.remove(2).unwrap();
        comments.push(text("x"));
    }
    let guard = post.read();
    let list = guard.get(POST_COMMENTS).unwrap().as_list().unwrap();
    let fused = FusedCollectionIndexActions::new(list.actions(), &|_| false);
    assert!(fused.is_empty());
    assert!(fused.translations().is_empty());
}

/// Property 5: flushing a dirty, lock-protected view always produces a new,
/// larger version, and the version fragment executes last.
#[test]
fn version_bump_is_monotonic_and_last() {
    let updater = updater();
    let author = loaded_author(1, "alice");
    let post = loaded_post(1, 3, "hello", &author);
    let mut session = MemorySession::new();
    seed_post(&mut session, &post);

    post.write().set(POST_TITLE, text("first edit")).unwrap();
    assert!(updater.flush(&mut session, &post).unwrap());
    let first = session.statements().last().unwrap().clone();
    assert_eq!(first.kind, StatementKind::Update);
    assert_eq!(
        first.assignments.last().unwrap(),
        &("version".to_string(), ScalarValue::Integer(4))
    );
    assert_eq!(
        post.read().get(POST_VERSION).unwrap(),
        &AttributeValue::Scalar(ScalarValue::Integer(4))
    );

    post.write().set(POST_TITLE, text("second edit")).unwrap();
    assert!(updater.flush(&mut session, &post).unwrap());
    let second = session.statements().last().unwrap();
    assert_eq!(
        second.assignments.last().unwrap(),
        &("version".to_string(), ScalarValue::Integer(5))
    );
}

/// Property 6: an update expected to match one row that matches zero rows
/// raises the optimistic-lock conflict.
#[test]
fn stale_version_update_conflicts() {
    let updater = updater();
    let author = loaded_author(1, "alice");
    let post = loaded_post(1, 3, "hello", &author);
    let mut session = MemorySession::new();
    seed_post(&mut session, &post);
    // Another transaction bumped the stored version.
    session
        .record("posts", &ScalarValue::Integer(1))
        .unwrap()
        .write()
        .set(
            "version",
            AttributeValue::Scalar(ScalarValue::Integer(9)),
        );

    post.write().set(POST_TITLE, text("stale edit")).unwrap();
    let result = updater.flush(&mut session, &post);
    assert!(matches!(result, Err(FlushError::OptimisticLock { .. })));
}

/// Property 7: fetch-graph merging is associative and idempotent.
#[test]
fn fetch_graph_merge_is_associative() {
    let a = FetchGraphNode::new("author").fetch("name");
    let b = FetchGraphNode::new("author")
        .fetch("email")
        .child(FetchGraphNode::new("address").fetch("city"));
    let c = FetchGraphNode::new("author").fetch("avatar");

    let left = a.merge_with(&b).unwrap().merge_with(&c).unwrap();
    let right = a.merge_with(&b.merge_with(&c).unwrap()).unwrap();
    assert_eq!(left.fetch_paths(""), right.fetch_paths(""));

    let idempotent = left.merge_with(&left).unwrap();
    assert_eq!(idempotent, left);
}

/// Property 8: pre-order cascades run strictly before the owning-row
/// delete, post-order cascades strictly after, in registration order.
#[test]
fn pre_and_post_delete_cascades_are_ordered() {
    let updater = ViewUpdater::new(post_mapping_with_cascades()).unwrap();
    let author = loaded_author(1, "alice");
    let post = loaded_post(1, 1, "hello", &author);
    let mut session = MemorySession::new();
    seed_post(&mut session, &post);
    session
        .record("posts", &ScalarValue::Integer(1))
        .unwrap()
        .write()
        .set(
            "attachment_id",
            AttributeValue::Scalar(ScalarValue::Integer(42)),
        );

    updater.remove(&mut session, &post).unwrap();

    let position = |predicate: &dyn Fn(&deltaview_engine::Statement) -> bool| {
        session
            .statements()
            .iter()
            .position(|statement| predicate(statement))
            .expect("statement present")
    };
    let notifications = position(&|statement| {
        statement.entity == "notifications" && statement.kind == StatementKind::Delete
    });
    let bookmarks = position(&|statement| {
        statement.entity == "bookmarks" && statement.kind == StatementKind::Update
    });
    let owner_delete = position(&|statement| {
        statement.entity == "posts"
            && statement.kind == StatementKind::Delete
            && statement.collection_path.is_none()
    });
    let attachments = position(&|statement| {
        statement.entity == "attachments" && statement.kind == StatementKind::Delete
    });

    assert!(notifications < bookmarks, "registration order holds");
    assert!(bookmarks < owner_delete, "pre-order runs before the row delete");
    assert!(owner_delete < attachments, "post-order runs after the row delete");
    assert!(
        session.record("posts", &ScalarValue::Integer(1)).is_none(),
        "owning row is gone"
    );
}

/// Property 8, capability swap: with native RETURNING support the plan skips
/// the fallback select but feeds the post-deleters identically.
#[test]
fn returning_capability_is_a_pure_strategy_swap() {
    let updater = ViewUpdater::new(post_mapping_with_cascades()).unwrap();
    let author = loaded_author(1, "alice");
    let post = loaded_post(1, 1, "hello", &author);
    let mut session = MemorySession::new().with_returning_support();
    seed_post(&mut session, &post);
    session
        .record("posts", &ScalarValue::Integer(1))
        .unwrap()
        .write()
        .set(
            "attachment_id",
            AttributeValue::Scalar(ScalarValue::Integer(42)),
        );

    updater.remove(&mut session, &post).unwrap();

    assert!(
        !session
            .statements()
            .iter()
            .any(|statement| statement.kind == StatementKind::Select),
        "no fallback select with native RETURNING"
    );
    let attachments_deleted = session.statements().iter().any(|statement| {
        statement.entity == "attachments"
            && statement.kind == StatementKind::Delete
            && statement.predicates.iter().any(|predicate| {
                matches!(
                    predicate,
                    deltaview_engine::Predicate::Eq { path, value }
                        if path == "id" && value == &ScalarValue::Integer(42)
                )
            })
    });
    assert!(attachments_deleted, "post-deleter consumed the returned value");
}

/// End-to-end: collection edits flush as minimal statements and the store
/// content converges to the view content.
#[test]
fn collection_edits_converge() {
    let updater = updater();
    let author = loaded_author(1, "alice");
    let post = loaded_post_with_content(1, 1, "t", &author, &["old"], &["a", "b", "c"], &[]);
    let mut session = MemorySession::new();
    seed_post(&mut session, &post);

    {
        let mut guard = post.write();
        let comments = guard.list_mut(POST_COMMENTS).unwrap();
        comments.remove(1).unwrap();
        comments.insert(1, text("d")).unwrap();
        let tags = guard.list_mut(POST_TAGS).unwrap();
        tags.push(text("fresh"));
    }
    assert!(updater.flush(&mut session, &post).unwrap());

    let comments: Vec<ScalarValue> = session
        .collection_rows("posts", "comments")
        .into_iter()
        .filter_map(|row| row.fields.get("element").cloned())
        .collect();
    assert_eq!(
        comments,
        vec![
            ScalarValue::Text("a".into()),
            ScalarValue::Text("d".into()),
            ScalarValue::Text("c".into()),
        ]
    );
    let tags: Vec<ScalarValue> = session
        .collection_rows("posts", "tags")
        .into_iter()
        .filter_map(|row| row.fields.get("element").cloned())
        .collect();
    assert_eq!(
        tags,
        vec![
            ScalarValue::Text("old".into()),
            ScalarValue::Text("fresh".into()),
        ]
    );
    assert!(!post.read().is_any_dirty());
}

/// End-to-end: a replaced subview reference with orphan removal schedules
/// the old object's delete after the new reference is written.
#[test]
fn orphan_removal_deletes_the_previous_reference_afterwards() {
    let mapping = Arc::new(
        ViewTypeMapping::new("PostView", "posts")
            .with_id(0, "id")
            .with_attribute(AttributeMapping::basic("id", 0, "id").read_only())
            .with_attribute(
                AttributeMapping::subview("author", 1, "author_id", author_mapping())
                    .with_orphan_removal(),
            ),
    );
    let updater = ViewUpdater::new(mapping).unwrap();
    let old_author = loaded_author(10, "old");
    let new_author = loaded_author(11, "new");
    let post = deltaview_model::ViewObject::loaded(
        "PostView",
        ScalarValue::Integer(1),
        vec![
            AttributeValue::Scalar(ScalarValue::Integer(1)),
            AttributeValue::View(old_author),
        ],
    )
    .unwrap()
    .wrap();
    let mut session = MemorySession::new();
    let mut record = deltaview_model::Record::with_id("posts", ScalarValue::Integer(1));
    record.set("id", AttributeValue::Scalar(ScalarValue::Integer(1)));
    record.set("author_id", AttributeValue::Scalar(ScalarValue::Integer(10)));
    session.seed_record(record);
    let mut author_row = deltaview_model::Record::with_id("authors", ScalarValue::Integer(10));
    author_row.set("id", AttributeValue::Scalar(ScalarValue::Integer(10)));
    session.seed_record(author_row);

    post.write()
        .set(1, AttributeValue::View(new_author))
        .unwrap();
    assert!(updater.flush(&mut session, &post).unwrap());

    let update_position = session
        .statements()
        .iter()
        .position(|statement| {
            statement.entity == "posts" && statement.kind == StatementKind::Update
        })
        .expect("reference update issued");
    let orphan_position = session
        .statements()
        .iter()
        .position(|statement| {
            statement.entity == "authors" && statement.kind == StatementKind::Delete
        })
        .expect("orphan delete issued");
    assert!(
        update_position < orphan_position,
        "the old reference is deleted only after the new one is written"
    );
    assert!(
        session.record("authors", &ScalarValue::Integer(10)).is_none(),
        "orphan row is gone"
    );
}

/// End-to-end: persisting a transient view attaches a record and assigns an
/// id and initial version.
#[test]
fn transient_view_is_persisted() {
    let updater = updater();
    let author = loaded_author(1, "alice");
    let post = deltaview_model::ViewObject::new_transient(
        "PostView",
        vec![
            AttributeValue::null(),
            AttributeValue::null(),
            text("fresh post"),
            AttributeValue::View(author),
            AttributeValue::List(deltaview_model::RecordingList::new()),
            AttributeValue::List(deltaview_model::RecordingList::new()),
            AttributeValue::Map(RecordingMap::new()),
        ],
    )
    .unwrap()
    .wrap();
    let mut session = MemorySession::new();

    assert!(updater.flush(&mut session, &post).unwrap());
    let guard = post.read();
    assert!(!guard.is_new());
    let id = guard.id().cloned().expect("id assigned");
    assert_eq!(
        guard.get(POST_VERSION).unwrap(),
        &AttributeValue::Scalar(ScalarValue::Integer(1))
    );
    let record = session.record("posts", &id).expect("record attached");
    assert_eq!(
        record.read().get("title"),
        Some(&AttributeValue::Scalar(ScalarValue::Text("fresh post".into())))
    );
}

/// Registration failures surface through the registry, before any flush.
#[test]
fn registry_rejects_invalid_mappings_eagerly() {
    let registry = UpdaterRegistry::new();
    let broken = ViewTypeMapping::new("Broken", "posts")
        .with_attribute(AttributeMapping::basic("a", 0, "a"))
        .with_attribute(AttributeMapping::basic("b", 0, "b"));
    assert!(matches!(
        registry.register(broken),
        Err(FlushError::Configuration { .. })
    ));
}
