//! Blog post and poll conversion tests

mod common;

use agora::authorization::Role;
use agora::blog::{create_blog_post, delete_blog_post, BlogPostInput};
use agora::conversion::{convert_to_thread, ConversionSource};
use agora::error::AgoraError;
use agora::orm::{blog_posts, dialogue_threads, opinion_polls};
use common::database::setup_test_database;
use common::fixtures::*;
use sea_orm::{entity::*, query::*};

#[actix_rt::test]
async fn test_blog_conversion_is_idempotent() {
    let db = setup_test_database().await.unwrap();
    let (ctx, dir) = allowing_context(&db);
    let author = create_test_user(&db, "writer", &[Role::Author]).await;

    let post = create_blog_post(
        &ctx,
        &author,
        BlogPostInput {
            title: "x".repeat(255),
            content: "The long read".into(),
        },
        Some(png_upload()),
        t0(),
    )
    .await
    .unwrap();

    let first = convert_to_thread(&ctx, &author, ConversionSource::BlogPost(post.id), at(5))
        .await
        .unwrap();
    assert!(first.created);
    assert_eq!(first.thread.title, post.title);
    assert_eq!(first.thread.body.as_deref(), Some("The long read"));
    assert_eq!(first.thread.author_id, author.user_id);
    let thumb = first.thread.thumbnail_image.clone().expect("thumbnail copied");
    assert!(dir.path().join("dialogue_thumbs").join(thumb).exists());

    let second = convert_to_thread(&ctx, &author, ConversionSource::BlogPost(post.id), at(9))
        .await
        .unwrap();
    assert!(!second.created);
    assert_eq!(second.thread.id, first.thread.id);
    assert_eq!(dialogue_threads::Entity::find().count(&db).await.unwrap(), 1);

    let post = blog_posts::Entity::find_by_id(post.id).one(&db).await.unwrap().unwrap();
    assert_eq!(post.dialogue_thread_id, Some(first.thread.id));

    // deleting the post leaves the thread
    delete_blog_post(&ctx, &author, post.id).await.unwrap();
    assert!(dialogue_threads::Entity::find_by_id(first.thread.id)
        .one(&db)
        .await
        .unwrap()
        .is_some());
}

#[actix_rt::test]
async fn test_poll_conversion_truncates_question() {
    let db = setup_test_database().await.unwrap();
    let (ctx, _dir) = allowing_context(&db);
    let author = create_test_user(&db, "author", &[Role::Author]).await;
    let poll = insert_poll(&db, author.user_id, at(60)).await;
    let mut long: opinion_polls::ActiveModel = poll.into();
    long.question = Set("q".repeat(300));
    let poll = long.update(&db).await.unwrap();

    // converting an expired poll is allowed
    let conversion = convert_to_thread(&ctx, &author, ConversionSource::Poll(poll.id), at(120))
        .await
        .unwrap();
    assert_eq!(conversion.thread.title.chars().count(), 255);
    assert_eq!(conversion.thread.thumbnail_image, None);

    let poll = opinion_polls::Entity::find_by_id(poll.id).one(&db).await.unwrap().unwrap();
    assert_eq!(poll.dialogue_thread_id, Some(conversion.thread.id));
}

#[actix_rt::test]
async fn test_conversion_needs_owner_or_staff() {
    let db = setup_test_database().await.unwrap();
    let (ctx, _dir) = allowing_context(&db);
    let author = create_test_user(&db, "author", &[Role::Author]).await;
    let stranger = create_test_user(&db, "stranger", &[Role::Author]).await;
    let superadmin = create_test_user(&db, "root", &[Role::Superadmin]).await;
    let poll = insert_poll(&db, author.user_id, at(60)).await;

    let denied = convert_to_thread(&ctx, &stranger, ConversionSource::Poll(poll.id), t0()).await;
    assert!(matches!(denied, Err(AgoraError::Permission(_))));
    assert_eq!(dialogue_threads::Entity::find().count(&db).await.unwrap(), 0);

    let conversion = convert_to_thread(&ctx, &superadmin, ConversionSource::Poll(poll.id), t0())
        .await
        .unwrap();
    assert_eq!(conversion.thread.author_id, superadmin.user_id);
}

#[actix_rt::test]
async fn test_convert_missing_source() {
    let db = setup_test_database().await.unwrap();
    let (ctx, _dir) = allowing_context(&db);
    let admin = create_test_user(&db, "admin", &[Role::Admin]).await;

    let result = convert_to_thread(&ctx, &admin, ConversionSource::BlogPost(77), t0()).await;
    assert!(matches!(result, Err(AgoraError::NotFound(_))));
}

#[actix_rt::test]
async fn test_concurrent_conversions_share_one_thread() {
    let db = setup_test_database().await.unwrap();
    let (ctx, _dir) = allowing_context(&db);
    let author = create_test_user(&db, "author", &[Role::Author]).await;
    let admin = create_test_user(&db, "admin", &[Role::Admin]).await;
    let poll = insert_poll(&db, author.user_id, at(600)).await;
    let source = ConversionSource::Poll(poll.id);

    let (first, second) = futures::future::join(
        convert_to_thread(&ctx, &author, source, at(1)),
        convert_to_thread(&ctx, &admin, source, at(1)),
    )
    .await;
    let first = first.unwrap();
    let second = second.unwrap();

    assert_eq!(first.thread.id, second.thread.id);
    assert_eq!(
        [first.created, second.created].iter().filter(|c| **c).count(),
        1
    );
    assert_eq!(dialogue_threads::Entity::find().count(&db).await.unwrap(), 1);
}
