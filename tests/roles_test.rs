//! Role management tests

mod common;

use agora::authorization::{Role, RoleSet};
use agora::error::AgoraError;
use agora::user::{find_identity, list_users, load_roles, set_roles, user_detail};
use common::database::setup_test_database;
use common::fixtures::create_test_user;

fn roles(list: &[Role]) -> RoleSet {
    list.iter().copied().collect()
}

#[actix_rt::test]
async fn test_admin_grants_author() {
    let db = setup_test_database().await.unwrap();
    let admin = create_test_user(&db, "admin", &[Role::Admin]).await;
    let target = create_test_user(&db, "writer", &[]).await;

    set_roles(&db, &admin, target.user_id, roles(&[Role::User, Role::Author]))
        .await
        .unwrap();

    let identity = find_identity(&db, target.user_id).await.unwrap().unwrap();
    assert!(identity.has_role(Role::Author));
    assert!(identity.has_role(Role::User));
}

#[actix_rt::test]
async fn test_only_superadmin_grants_superadmin() {
    let db = setup_test_database().await.unwrap();
    let admin = create_test_user(&db, "admin", &[Role::Admin]).await;
    let root = create_test_user(&db, "root", &[Role::Superadmin]).await;
    let target = create_test_user(&db, "target", &[]).await;

    let denied = set_roles(&db, &admin, target.user_id, roles(&[Role::Superadmin])).await;
    assert!(matches!(denied, Err(AgoraError::Permission(_))));
    assert!(!load_roles(&db, target.user_id)
        .await
        .unwrap()
        .contains(Role::Superadmin));

    set_roles(&db, &root, target.user_id, roles(&[Role::User, Role::Superadmin]))
        .await
        .unwrap();
    assert!(load_roles(&db, target.user_id)
        .await
        .unwrap()
        .contains(Role::Superadmin));

    // an admin cannot demote a superadmin either
    let demote = set_roles(&db, &admin, target.user_id, roles(&[Role::User])).await;
    assert!(matches!(demote, Err(AgoraError::Permission(_))));
}

#[actix_rt::test]
async fn test_plain_user_cannot_manage_roles() {
    let db = setup_test_database().await.unwrap();
    let plain = create_test_user(&db, "plain", &[]).await;
    let target = create_test_user(&db, "target", &[]).await;

    let result = set_roles(&db, &plain, target.user_id, roles(&[Role::Author])).await;
    assert!(matches!(result, Err(AgoraError::Permission(_))));

    let empty = set_roles(&db, &plain, target.user_id, RoleSet::new()).await;
    assert!(matches!(empty, Err(AgoraError::Validation(_))));
}

#[actix_rt::test]
async fn test_staff_lists_and_searches_users() {
    let db = setup_test_database().await.unwrap();
    let admin = create_test_user(&db, "admin", &[Role::Admin]).await;
    let alice = create_test_user(&db, "Alice", &[Role::Author]).await;
    let bob = create_test_user(&db, "bob", &[]).await;

    let all = list_users(&db, &admin, None).await.unwrap();
    let names: Vec<&str> = all.iter().map(|u| u.user.username.as_str()).collect();
    assert_eq!(names, vec!["bob", "Alice", "admin"], "newest first");

    let found = list_users(&db, &admin, Some(" ALI ")).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].user.id, alice.user_id);
    assert_eq!(found[0].roles, vec!["user", "author"]);

    let by_id = list_users(&db, &admin, Some(&bob.user_id.to_string())).await.unwrap();
    assert!(by_id.iter().any(|u| u.user.id == bob.user_id));

    let detail = user_detail(&db, &admin, bob.user_id).await.unwrap();
    assert_eq!(detail.user.username, "bob");
    assert_eq!(detail.roles, vec!["user"]);

    let missing = user_detail(&db, &admin, 9999).await;
    assert!(matches!(missing, Err(AgoraError::NotFound(_))));
}

#[actix_rt::test]
async fn test_user_overview_needs_staff() {
    let db = setup_test_database().await.unwrap();
    let author = create_test_user(&db, "writer", &[Role::Author]).await;

    let listed = list_users(&db, &author, None).await;
    assert!(matches!(listed, Err(AgoraError::Permission(_))));
    let detail = user_detail(&db, &author, author.user_id).await;
    assert!(matches!(detail, Err(AgoraError::Permission(_))));
}
