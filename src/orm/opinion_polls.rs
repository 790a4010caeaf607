//! SeaORM Entity for opinion_polls table

use sea_orm::entity::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "opinion_polls")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub question: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub author_id: i32,
    pub thumbnail_image: Option<String>,
    pub created_at: DateTime,
    /// Votes are accepted only while `now < expires_at`.
    pub expires_at: DateTime,
    pub yes_count: i32,
    pub no_count: i32,
    /// Always `yes_count - no_count`
    pub score: i32,
    /// Provenance link set when the poll is promoted to a dialogue thread.
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
    #[sea_orm(has_many = "super::opinion_poll_votes::Entity")]
    Votes,
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

impl Related<super::opinion_poll_votes::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Votes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
