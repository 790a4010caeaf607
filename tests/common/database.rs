//! Test database setup and management
#![allow(dead_code)]

use sea_orm::{DatabaseConnection, DbErr};
use std::env;

/// Get a test database connection
/// Uses TEST_DATABASE_URL or falls back to a private in-memory SQLite database
pub async fn get_test_db() -> Result<DatabaseConnection, DbErr> {
    let database_url = env::var("TEST_DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_string());
    agora::db::connect(&database_url).await
}

/// Setup test database - connect, create tables and seed the roles
pub async fn setup_test_database() -> Result<DatabaseConnection, DbErr> {
    let db = get_test_db().await?;
    agora::db::create_schema(&db).await?;
    agora::db::seed_roles(&db).await?;
    Ok(db)
}
