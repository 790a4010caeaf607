//! User accounts and their role sets.
//!
//! Registration and login live outside this crate; this module only creates
//! the account row, resolves a session's user id into an [`Identity`] and
//! lets staff edit role assignments.

use crate::authorization::{authorize_role_change, Capability, Identity, Role, RoleSet};
use crate::error::AgoraError;
use crate::orm::{roles, user_roles, users};
use chrono::Utc;
use sea_orm::{
    entity::*, query::*, sea_query::Expr, Condition, ConnectionTrait, DatabaseConnection, DbErr,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Fields for a new account.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewUser {
    #[validate(length(min = 1, max = 64, message = "must be 1 to 64 characters"))]
    pub username: String,
    #[validate(length(max = 120))]
    pub first_name: Option<String>,
    #[validate(length(max = 120))]
    pub last_name: Option<String>,
    #[validate(email(message = "must be a valid email address"))]
    pub email: Option<String>,
}

/// Loads the roles assigned to `user_id`. Unknown role names are skipped.
pub async fn load_roles<C: ConnectionTrait>(db: &C, user_id: i32) -> Result<RoleSet, DbErr> {
    let rows = roles::Entity::find()
        .inner_join(user_roles::Entity)
        .filter(user_roles::Column::UserId.eq(user_id))
        .all(db)
        .await?;

    let mut set = RoleSet::new();
    for row in rows {
        match Role::parse(&row.name) {
            Some(role) => {
                set.insert(role);
            }
            None => log::warn!("User {} has unknown role {:?}", user_id, row.name),
        }
    }
    Ok(set)
}

/// Resolves a user id into an identity, or `None` if the user is gone.
pub async fn find_identity(
    db: &DatabaseConnection,
    user_id: i32,
) -> Result<Option<Identity>, DbErr> {
    let user = users::Entity::find_by_id(user_id).one(db).await?;
    match user {
        Some(user) => Ok(Some(Identity::new(user.id, load_roles(db, user.id).await?))),
        None => Ok(None),
    }
}

async fn role_ids<C: ConnectionTrait>(db: &C, set: &RoleSet) -> Result<Vec<i32>, DbErr> {
    let names: Vec<&str> = set.names();
    let rows = roles::Entity::find()
        .filter(roles::Column::Name.is_in(names.clone()))
        .all(db)
        .await?;
    if rows.len() != names.len() {
        return Err(DbErr::RecordNotFound(format!(
            "roles {:?} are not all seeded",
            names
        )));
    }
    Ok(rows.into_iter().map(|r| r.id).collect())
}

/// Creates an account with the default `user` role.
pub async fn create_user(db: &DatabaseConnection, new: NewUser) -> Result<users::Model, AgoraError> {
    new.validate()?;
    let username = new.username.trim().to_string();

    let taken = users::Entity::find()
        .filter(users::Column::Username.eq(username.clone()))
        .one(db)
        .await?;
    if taken.is_some() {
        return Err(AgoraError::validation("username: already taken"));
    }

    let txn = db.begin().await?;

    let user = users::ActiveModel {
        username: Set(username),
        first_name: Set(new.first_name),
        last_name: Set(new.last_name),
        email: Set(new.email),
        created_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let default_roles: RoleSet = [Role::User].into_iter().collect();
    for role_id in role_ids(&txn, &default_roles).await? {
        user_roles::Entity::insert(user_roles::ActiveModel {
            user_id: Set(user.id),
            role_id: Set(role_id),
        })
        .exec(&txn)
        .await?;
    }

    txn.commit().await?;
    log::info!("Created user {} ({})", user.id, user.username);
    Ok(user)
}

/// An account with its role names, as shown to staff.
#[derive(Debug, Clone, Serialize)]
pub struct UserWithRoles {
    #[serde(flatten)]
    pub user: users::Model,
    pub roles: Vec<&'static str>,
}

async fn with_roles(db: &DatabaseConnection, user: users::Model) -> Result<UserWithRoles, DbErr> {
    let roles = load_roles(db, user.id).await?.names();
    Ok(UserWithRoles { user, roles })
}

/// Lists accounts newest first for staff.
///
/// `query` matches usernames case-insensitively; a numeric query also
/// matches the user id.
pub async fn list_users(
    db: &DatabaseConnection,
    actor: &Identity,
    query: Option<&str>,
) -> Result<Vec<UserWithRoles>, AgoraError> {
    actor.can(Capability::ManageUsers, None).require()?;

    let mut select = users::Entity::find();
    let q = query.map(str::trim).unwrap_or("");
    if !q.is_empty() {
        let pattern = format!("%{}%", q.to_lowercase());
        let mut matches =
            Condition::any().add(Expr::cust_with_values("LOWER(username) LIKE ?", vec![pattern]));
        if q.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(id) = q.parse::<i32>() {
                matches = matches.add(users::Column::Id.eq(id));
            }
        }
        select = select.filter(matches);
    }

    let rows = select
        .order_by_desc(users::Column::CreatedAt)
        .order_by_desc(users::Column::Id)
        .all(db)
        .await?;
    let mut listed = Vec::with_capacity(rows.len());
    for user in rows {
        listed.push(with_roles(db, user).await?);
    }
    Ok(listed)
}

/// One account and its roles, for staff.
pub async fn user_detail(
    db: &DatabaseConnection,
    actor: &Identity,
    user_id: i32,
) -> Result<UserWithRoles, AgoraError> {
    actor.can(Capability::ManageUsers, None).require()?;
    let user = users::Entity::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or(AgoraError::NotFound("User"))?;
    Ok(with_roles(db, user).await?)
}

/// Replaces the role set of `target_user_id`.
pub async fn set_roles(
    db: &DatabaseConnection,
    actor: &Identity,
    target_user_id: i32,
    requested: RoleSet,
) -> Result<RoleSet, AgoraError> {
    if requested.is_empty() {
        return Err(AgoraError::validation("roles: at least one role is required"));
    }

    users::Entity::find_by_id(target_user_id)
        .one(db)
        .await?
        .ok_or(AgoraError::NotFound("User"))?;

    let txn = db.begin().await?;
    let current = load_roles(&txn, target_user_id).await?;
    authorize_role_change(actor, &current, &requested).require()?;

    user_roles::Entity::delete_many()
        .filter(user_roles::Column::UserId.eq(target_user_id))
        .exec(&txn)
        .await?;
    for role_id in role_ids(&txn, &requested).await? {
        user_roles::Entity::insert(user_roles::ActiveModel {
            user_id: Set(target_user_id),
            role_id: Set(role_id),
        })
        .exec(&txn)
        .await?;
    }
    txn.commit().await?;

    log::info!(
        "User {} set roles of user {} to {:?}",
        actor.user_id,
        target_user_id,
        requested.names()
    );
    Ok(requested)
}
