//! Thread and comment service tests

mod common;

use agora::authorization::Role;
use agora::dialogue::{
    create_comment, create_thread, delete_comment, delete_thread, list_threads, view_thread,
    CommentInput, ThreadInput,
};
use agora::error::AgoraError;
use agora::orm::{
    blog_posts, dialogue_comment_votes, dialogue_comments, dialogue_thread_votes,
    dialogue_threads, opinion_polls,
};
use agora::vote::{cast_vote, VoteDirection, VoteTarget};
use common::database::setup_test_database;
use common::fixtures::*;
use sea_orm::{entity::*, query::*};

fn comment(body: &str, parent_id: Option<i32>) -> CommentInput {
    CommentInput {
        body: body.to_string(),
        parent_id,
    }
}

#[actix_rt::test]
async fn test_create_thread_and_reply_tree() {
    let db = setup_test_database().await.unwrap();
    let (ctx, _dir) = allowing_context(&db);
    let alice = create_test_user(&db, "alice", &[]).await;
    let bob = create_test_user(&db, "bob", &[]).await;

    let thread = create_thread(
        &ctx,
        &alice,
        ThreadInput {
            title: "Speed bumps on Main Street".into(),
            body: Some("Yes or no?".into()),
        },
        None,
        t0(),
    )
    .await
    .unwrap();

    let root = create_comment(&ctx, &bob, thread.id, comment("Yes", None), at(1))
        .await
        .unwrap();
    let reply = create_comment(&ctx, &alice, thread.id, comment("Why?", Some(root.id)), at(2))
        .await
        .unwrap();
    let other = create_comment(&ctx, &alice, thread.id, comment("No", None), at(3))
        .await
        .unwrap();

    let view = view_thread(&db, thread.id).await.unwrap();
    let roots: Vec<i32> = view.comments.roots().iter().map(|c| c.id).collect();
    assert_eq!(roots, vec![root.id, other.id]);
    let children: Vec<i32> = view.comments.children_of(root.id).iter().map(|c| c.id).collect();
    assert_eq!(children, vec![reply.id]);
}

#[actix_rt::test]
async fn test_reply_to_comment_of_other_thread_is_rejected() {
    let db = setup_test_database().await.unwrap();
    let (ctx, _dir) = allowing_context(&db);
    let alice = create_test_user(&db, "alice", &[]).await;
    let first = insert_thread(&db, alice.user_id, "First").await;
    let second = insert_thread(&db, alice.user_id, "Second").await;
    let foreign = insert_comment(&db, first.id, alice.user_id, None, "Here").await;

    let result = create_comment(&ctx, &alice, second.id, comment("There", Some(foreign.id)), t0()).await;
    assert!(matches!(result, Err(AgoraError::Validation(_))));

    let missing = create_comment(&ctx, &alice, second.id, comment("There", Some(9999)), t0()).await;
    assert!(matches!(missing, Err(AgoraError::Validation(_))));
}

#[actix_rt::test]
async fn test_delete_comment_reroots_replies() {
    let db = setup_test_database().await.unwrap();
    let (ctx, _dir) = allowing_context(&db);
    let alice = create_test_user(&db, "alice", &[]).await;
    let bob = create_test_user(&db, "bob", &[]).await;
    let thread = insert_thread(&db, alice.user_id, "Trees").await;
    let parent = insert_comment(&db, thread.id, alice.user_id, None, "Plant more").await;
    let child = insert_comment(&db, thread.id, bob.user_id, Some(parent.id), "Which kind?").await;
    cast_vote(&db, bob.user_id, VoteTarget::Comment(parent.id), VoteDirection::Up, t0())
        .await
        .unwrap();

    // bob does not own the parent
    let denied = delete_comment(&ctx, &bob, parent.id).await;
    assert!(matches!(denied, Err(AgoraError::Permission(_))));

    delete_comment(&ctx, &alice, parent.id).await.unwrap();

    let child = dialogue_comments::Entity::find_by_id(child.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(child.parent_id, None);
    let votes = dialogue_comment_votes::Entity::find().count(&db).await.unwrap();
    assert_eq!(votes, 0);
}

#[actix_rt::test]
async fn test_delete_thread_cascades_and_voids_links() {
    let db = setup_test_database().await.unwrap();
    let (ctx, _dir) = allowing_context(&db);
    let alice = create_test_user(&db, "alice", &[]).await;
    let admin = create_test_user(&db, "admin", &[Role::Admin]).await;
    let thread = insert_thread(&db, alice.user_id, "Market day").await;
    let c1 = insert_comment(&db, thread.id, alice.user_id, None, "Saturday").await;
    let c2 = insert_comment(&db, thread.id, alice.user_id, Some(c1.id), "Sunday").await;
    cast_vote(&db, admin.user_id, VoteTarget::Thread(thread.id), VoteDirection::Up, t0())
        .await
        .unwrap();
    cast_vote(&db, admin.user_id, VoteTarget::Comment(c2.id), VoteDirection::Down, t0())
        .await
        .unwrap();

    let post = blog_posts::ActiveModel {
        title: Set("Market".into()),
        content: Set("Details".into()),
        thumbnail_image: Set(None),
        created_at: Set(t0()),
        author_id: Set(alice.user_id),
        dialogue_thread_id: Set(Some(thread.id)),
        ..Default::default()
    }
    .insert(&db)
    .await
    .unwrap();
    let poll = insert_poll(&db, alice.user_id, at(600)).await;
    let mut linked: opinion_polls::ActiveModel = poll.into();
    linked.dialogue_thread_id = Set(Some(thread.id));
    let poll = linked.update(&db).await.unwrap();

    // the owner is not staff
    let denied = delete_thread(&ctx, &alice, thread.id).await;
    assert!(matches!(denied, Err(AgoraError::Permission(_))));

    delete_thread(&ctx, &admin, thread.id).await.unwrap();

    assert!(dialogue_threads::Entity::find_by_id(thread.id)
        .one(&db)
        .await
        .unwrap()
        .is_none());
    assert_eq!(dialogue_comments::Entity::find().count(&db).await.unwrap(), 0);
    assert_eq!(dialogue_comment_votes::Entity::find().count(&db).await.unwrap(), 0);
    assert_eq!(dialogue_thread_votes::Entity::find().count(&db).await.unwrap(), 0);

    let post = blog_posts::Entity::find_by_id(post.id).one(&db).await.unwrap().unwrap();
    assert_eq!(post.dialogue_thread_id, None);
    let poll = opinion_polls::Entity::find_by_id(poll.id).one(&db).await.unwrap().unwrap();
    assert_eq!(poll.dialogue_thread_id, None);
}

#[actix_rt::test]
async fn test_threads_listed_by_score() {
    let db = setup_test_database().await.unwrap();
    let alice = create_test_user(&db, "alice", &[]).await;
    let quiet = insert_thread(&db, alice.user_id, "Quiet").await;
    let popular = insert_thread(&db, alice.user_id, "Popular").await;
    cast_vote(&db, alice.user_id, VoteTarget::Thread(popular.id), VoteDirection::Up, t0())
        .await
        .unwrap();

    let ids: Vec<i32> = list_threads(&db).await.unwrap().iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![popular.id, quiet.id]);
}
