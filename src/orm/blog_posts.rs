//! SeaORM Entity for blog_posts table

use sea_orm::entity::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "blog_posts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub content: String,
    pub thumbnail_image: Option<String>,
    pub created_at: DateTime,
    pub author_id: i32,
    /// Provenance link set when the post is promoted to a dialogue thread.
    pub dialogue_thread_id: Option<i32>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::AuthorId",
        to = "super::users::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Author,
    #[sea_orm(
        belongs_to = "super::dialogue_threads::Entity",
        from = "Column::DialogueThreadId",
        to = "super::dialogue_threads::Column::Id",
        on_update = "NoAction",
        on_delete = "SetNull"
    )]
    DialogueThread,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Author.def()
    }
}

impl Related<super::dialogue_threads::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DialogueThread.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
