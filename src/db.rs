//! Database connection and schema bootstrap.
//!
//! Production runs against Postgres with an externally managed schema.
//! Development and tests use SQLite, where [`create_schema`] builds the
//! tables straight from the entities.

use crate::authorization::Role;
use crate::orm::{
    blog_posts, dialogue_comment_votes, dialogue_comments, dialogue_thread_votes,
    dialogue_threads, opinion_poll_votes, opinion_polls, roles, user_roles, users, word_filters,
};
use sea_orm::{
    entity::*, query::*, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr,
    EntityTrait, Schema, Statement,
};

/// Opens a connection pool.
///
/// SQLite in-memory databases are per connection, so the pool is pinned to
/// a single connection for them.
pub async fn connect(url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(url.to_owned());
    if url.starts_with("sqlite:") {
        opt.max_connections(1).min_connections(1);
    }
    opt.sqlx_logging(false);

    let db = Database::connect(opt).await?;
    log::info!("Connected to {:?} database", db.get_database_backend());
    Ok(db)
}

async fn create_table<E: EntityTrait>(db: &DatabaseConnection, entity: E) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let mut stmt = Schema::new(backend).create_table_from_entity(entity);
    stmt.if_not_exists();
    db.execute(backend.build(&stmt)).await?;
    Ok(())
}

/// One vote per (user, target).
const UNIQUE_VOTE_INDEXES: &[(&str, &str, &str)] = &[
    ("uq_user_thread_vote", "dialogue_thread_votes", "thread_id"),
    ("uq_user_comment_vote", "dialogue_comment_votes", "comment_id"),
    ("uq_user_poll_vote", "opinion_poll_votes", "poll_id"),
];

/// Creates every table and the vote uniqueness indexes if missing.
pub async fn create_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    // Referenced tables first
    create_table(db, users::Entity).await?;
    create_table(db, roles::Entity).await?;
    create_table(db, user_roles::Entity).await?;
    create_table(db, dialogue_threads::Entity).await?;
    create_table(db, blog_posts::Entity).await?;
    create_table(db, dialogue_comments::Entity).await?;
    create_table(db, dialogue_thread_votes::Entity).await?;
    create_table(db, dialogue_comment_votes::Entity).await?;
    create_table(db, opinion_polls::Entity).await?;
    create_table(db, opinion_poll_votes::Entity).await?;
    create_table(db, word_filters::Entity).await?;

    let backend = db.get_database_backend();
    for (name, table, target) in UNIQUE_VOTE_INDEXES {
        db.execute(Statement::from_string(
            backend,
            format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} (user_id, {})",
                name, table, target
            ),
        ))
        .await?;
    }

    log::info!("Database schema ready");
    Ok(())
}

/// Inserts the built-in roles that are not present yet.
pub async fn seed_roles(db: &DatabaseConnection) -> Result<(), DbErr> {
    for role in Role::ALL {
        let existing = roles::Entity::find()
            .filter(roles::Column::Name.eq(role.as_str()))
            .one(db)
            .await?;
        if existing.is_none() {
            roles::ActiveModel {
                name: Set(role.as_str().to_owned()),
                ..Default::default()
            }
            .insert(db)
            .await?;
            log::info!("Seeded role {}", role);
        }
    }
    Ok(())
}

/// True when `err` means a unique index rejected the write or the database
/// aborted the transaction because of a concurrent one.
pub fn is_write_conflict(err: &DbErr) -> bool {
    let message = err.to_string();
    [
        "UNIQUE constraint failed",
        "duplicate key value",
        "could not serialize",
        "deadlock detected",
        "database is locked",
    ]
    .iter()
    .any(|needle| message.contains(needle))
}
