//! Canned view types and loaded view graphs.

use crate::session::MemorySession;
use deltaview_engine::{
    AttributeMapping, CascadeAction, PostRemoveCascade, PreRemoveCascade, TypeDescriptor,
    ViewTypeMapping,
};
use deltaview_model::{
    AttributeValue, Record, RecordingList, RecordingMap, ScalarValue, ViewObject, ViewRef,
};
use std::sync::Arc;

/// Slot of the post id attribute.
pub const POST_ID: usize = 0;
/// Slot of the post version attribute.
pub const POST_VERSION: usize = 1;
/// Slot of the post title attribute.
pub const POST_TITLE: usize = 2;
/// Slot of the post author reference.
pub const POST_AUTHOR: usize = 3;
/// Slot of the post tags collection.
pub const POST_TAGS: usize = 4;
/// Slot of the post comments list.
pub const POST_COMMENTS: usize = 5;
/// Slot of the post metadata map.
pub const POST_META: usize = 6;

/// Mapping for a simple author view.
#[must_use]
pub fn author_mapping() -> Arc<ViewTypeMapping> {
    Arc::new(
        ViewTypeMapping::new("AuthorView", "authors")
            .with_id(0, "id")
            .with_attribute(AttributeMapping::basic("id", 0, "id").read_only())
            .with_attribute(AttributeMapping::basic("name", 1, "name")),
    )
}

/// Mapping for a post view exercising every attribute shape: basic scalar,
/// version, subview reference, unordered collection, indexed list, and map.
#[must_use]
pub fn post_mapping() -> Arc<ViewTypeMapping> {
    Arc::new(
        ViewTypeMapping::new("PostView", "posts")
            .with_id(POST_ID, "id")
            .with_version(POST_VERSION, "version")
            .with_attribute(AttributeMapping::basic("id", POST_ID, "id").read_only())
            .with_attribute(AttributeMapping::version("version", POST_VERSION, "version"))
            .with_attribute(AttributeMapping::basic("title", POST_TITLE, "title"))
            .with_attribute(AttributeMapping::subview(
                "author",
                POST_AUTHOR,
                "author_id",
                author_mapping(),
            ))
            .with_attribute(AttributeMapping::collection(
                "tags",
                POST_TAGS,
                "tags",
                TypeDescriptor::basic(),
            ))
            .with_attribute(AttributeMapping::indexed_list(
                "comments",
                POST_COMMENTS,
                "comments",
                TypeDescriptor::basic(),
            ))
            .with_attribute(AttributeMapping::map(
                "meta",
                POST_META,
                "meta",
                TypeDescriptor::basic(),
                TypeDescriptor::basic(),
            )),
    )
}

/// Post mapping extended with unmapped pre- and post-remove cascades.
#[must_use]
pub fn post_mapping_with_cascades() -> Arc<ViewTypeMapping> {
    let base = Arc::try_unwrap(post_mapping()).unwrap_or_else(|arc| (*arc).clone());
    Arc::new(
        base.with_pre_remove_cascade(PreRemoveCascade {
            entity: "notifications".into(),
            reference_column: "post_id".into(),
            action: CascadeAction::Delete,
        })
        .with_pre_remove_cascade(PreRemoveCascade {
            entity: "bookmarks".into(),
            reference_column: "post_id".into(),
            action: CascadeAction::SetNull,
        })
        .with_post_remove_cascade(PostRemoveCascade {
            entity: "attachments".into(),
            id_column: "id".into(),
            owner_column: "attachment_id".into(),
        }),
    )
}

/// A loaded author view.
#[must_use]
pub fn loaded_author(id: i64, name: &str) -> ViewRef {
    ViewObject::loaded(
        "AuthorView",
        ScalarValue::Integer(id),
        vec![
            AttributeValue::Scalar(ScalarValue::Integer(id)),
            AttributeValue::Scalar(ScalarValue::Text(name.into())),
        ],
    )
    .expect("author view fits the tracked-slot limit")
    .wrap()
}

/// A loaded post view with the given scalar content and empty containers.
#[must_use]
pub fn loaded_post(id: i64, version: i64, title: &str, author: &ViewRef) -> ViewRef {
    loaded_post_with_content(id, version, title, author, &[], &[], &[])
}

/// A loaded post view with collection content.
#[must_use]
pub fn loaded_post_with_content(
    id: i64,
    version: i64,
    title: &str,
    author: &ViewRef,
    tags: &[&str],
    comments: &[&str],
    meta: &[(&str, &str)],
) -> ViewRef {
    let tags = RecordingList::from_elements(
        tags.iter()
            .map(|tag| AttributeValue::Scalar(ScalarValue::Text((*tag).into())))
            .collect(),
    );
    let comments = RecordingList::from_elements(
        comments
            .iter()
            .map(|comment| AttributeValue::Scalar(ScalarValue::Text((*comment).into())))
            .collect(),
    );
    let meta = RecordingMap::from_entries(
        meta.iter()
            .map(|(key, value)| {
                (
                    ScalarValue::Text((*key).into()),
                    AttributeValue::Scalar(ScalarValue::Text((*value).into())),
                )
            })
            .collect(),
    );
    ViewObject::loaded(
        "PostView",
        ScalarValue::Integer(id),
        vec![
            AttributeValue::Scalar(ScalarValue::Integer(id)),
            AttributeValue::Scalar(ScalarValue::Integer(version)),
            AttributeValue::Scalar(ScalarValue::Text(title.into())),
            AttributeValue::View(ViewRef::clone(author)),
            AttributeValue::List(tags),
            AttributeValue::List(comments),
            AttributeValue::Map(meta),
        ],
    )
    .expect("post view fits the tracked-slot limit")
    .wrap()
}

/// Seeds a session with the store-side rows backing a loaded post view.
pub fn seed_post(session: &mut MemorySession, post: &ViewRef) {
    let guard = post.read();
    let id = guard.id().cloned().expect("loaded post has an id");

    let mut record = Record::with_id("posts", id.clone());
    record.set("id", AttributeValue::Scalar(id.clone()));
    for (slot, column) in [(POST_VERSION, "version"), (POST_TITLE, "title")] {
        if let Ok(AttributeValue::Scalar(scalar)) = guard.get(slot).cloned() {
            record.set(column, AttributeValue::Scalar(scalar));
        }
    }
    if let Ok(AttributeValue::View(author)) = guard.get(POST_AUTHOR) {
        if let Some(author_id) = author.read().id().cloned() {
            record.set("author_id", AttributeValue::Scalar(author_id));
        }
    }
    session.seed_record(record);

    if let Ok(AttributeValue::List(tags)) = guard.get(POST_TAGS) {
        for tag in tags.iter() {
            if let AttributeValue::Scalar(scalar) = tag {
                session.seed_collection_row(
                    "posts",
                    "tags",
                    vec![
                        ("owner_id".to_string(), id.clone()),
                        ("element".to_string(), scalar.clone()),
                    ],
                    None,
                );
            }
        }
    }
    if let Ok(AttributeValue::List(comments)) = guard.get(POST_COMMENTS) {
        for (index, comment) in comments.iter().enumerate() {
            if let AttributeValue::Scalar(scalar) = comment {
                session.seed_collection_row(
                    "posts",
                    "comments",
                    vec![
                        ("owner_id".to_string(), id.clone()),
                        ("element".to_string(), scalar.clone()),
                    ],
                    Some(index as i64),
                );
            }
        }
    }
    if let Ok(AttributeValue::Map(meta)) = guard.get(POST_META) {
        for (key, value) in meta.iter() {
            if let AttributeValue::Scalar(scalar) = value {
                session.seed_collection_row(
                    "posts",
                    "meta",
                    vec![
                        ("owner_id".to_string(), id.clone()),
                        ("map_key".to_string(), key.clone()),
                        ("element".to_string(), scalar.clone()),
                    ],
                    None,
                );
            }
        }
    }
}
