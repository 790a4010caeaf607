//! Test fixtures for creating test data
#![allow(dead_code)]

use agora::authorization::{Identity, Role, RoleSet};
use agora::context::AppContext;
use agora::moderation::{Classifier, ModerationGate, StaticClassifier};
use agora::orm::{dialogue_comments, dialogue_threads, opinion_polls, roles, user_roles};
use agora::storage::local::LocalStorage;
use agora::upload::UploadedImage;
use agora::user::{create_user, NewUser};
use actix_web::web::Bytes;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use sea_orm::{entity::*, query::*, ActiveValue::Set, DatabaseConnection};
use std::sync::Arc;
use tempfile::TempDir;

/// A tiny but well-formed PNG header; enough for type sniffing.
pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01";

/// Fixed clock for tests
pub fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

pub fn at(seconds: i64) -> NaiveDateTime {
    t0() + Duration::seconds(seconds)
}

/// Create a user holding `extra` roles in addition to `user`
pub async fn create_test_user(db: &DatabaseConnection, username: &str, extra: &[Role]) -> Identity {
    let user = create_user(
        db,
        NewUser {
            username: username.to_string(),
            first_name: None,
            last_name: None,
            email: Some(format!("{}@test.com", username)),
        },
    )
    .await
    .expect("Failed to create user");

    for role in extra {
        let row = roles::Entity::find()
            .filter(roles::Column::Name.eq(role.as_str()))
            .one(db)
            .await
            .unwrap()
            .expect("role is seeded");
        user_roles::Entity::insert(user_roles::ActiveModel {
            user_id: Set(user.id),
            role_id: Set(row.id),
        })
        .exec(db)
        .await
        .unwrap();
    }

    let mut set: RoleSet = extra.iter().copied().collect();
    set.insert(Role::User);
    Identity::new(user.id, set)
}

/// Application context over `db` with a temporary asset directory.
pub fn test_context(db: &DatabaseConnection, classifier: Arc<dyn Classifier>) -> (AppContext, TempDir) {
    context_with_gate(db, ModerationGate::new(classifier, &Default::default()))
}

/// Application context over `db` using `gate`.
pub fn context_with_gate(db: &DatabaseConnection, gate: ModerationGate) -> (AppContext, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let storage = LocalStorage::new(dir.path().to_path_buf()).unwrap();
    let ctx = AppContext::new(db.clone(), Arc::new(gate), Arc::new(storage), 1024 * 1024);
    (ctx, dir)
}

pub fn allowing_context(db: &DatabaseConnection) -> (AppContext, TempDir) {
    test_context(db, Arc::new(StaticClassifier::allow_all()))
}

pub fn png_upload() -> UploadedImage {
    UploadedImage {
        filename: Some("thumb.png".into()),
        content_type: Some("image/png".into()),
        bytes: Bytes::from_static(PNG),
    }
}

/// Number of files in one asset directory
pub fn files_in(dir: &TempDir, area: &str) -> usize {
    match std::fs::read_dir(dir.path().join(area)) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}

pub async fn insert_thread(db: &DatabaseConnection, author_id: i32, title: &str) -> dialogue_threads::Model {
    dialogue_threads::ActiveModel {
        title: Set(title.to_string()),
        body: Set(None),
        author_id: Set(author_id),
        thumbnail_image: Set(None),
        created_at: Set(t0()),
        score: Set(0),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn insert_comment(
    db: &DatabaseConnection,
    thread_id: i32,
    author_id: i32,
    parent_id: Option<i32>,
    body: &str,
) -> dialogue_comments::Model {
    dialogue_comments::ActiveModel {
        body: Set(body.to_string()),
        created_at: Set(t0()),
        score: Set(0),
        thread_id: Set(thread_id),
        author_id: Set(author_id),
        parent_id: Set(parent_id),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn insert_poll(
    db: &DatabaseConnection,
    author_id: i32,
    expires_at: NaiveDateTime,
) -> opinion_polls::Model {
    opinion_polls::ActiveModel {
        question: Set("Should the library open on Sundays?".to_string()),
        description: Set(None),
        author_id: Set(author_id),
        thumbnail_image: Set(None),
        created_at: Set(t0()),
        expires_at: Set(expires_at),
        yes_count: Set(0),
        no_count: Set(0),
        score: Set(0),
        dialogue_thread_id: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}
