//! Word filter entity for moderation evidence
//!
//! Each enabled filter contributes matches to one evidence list:
//! - `profanity`: matched terms force a block
//! - `suspicious_phrase`: matched terms are reported as suspicious phrases

use sea_orm::entity::prelude::*;

/// Evidence category a filter reports into
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(Some(20))")]
#[derive(Default)]
pub enum FilterCategory {
    #[sea_orm(string_value = "profanity")]
    #[default]
    Profanity,
    #[sea_orm(string_value = "suspicious_phrase")]
    SuspiciousPhrase,
}

impl FilterCategory {
    /// Returns true if this is the Profanity category
    pub fn is_profanity(&self) -> bool {
        matches!(self, FilterCategory::Profanity)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "word_filters")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub pattern: String,
    pub is_regex: bool,
    pub is_case_sensitive: bool,
    pub is_whole_word: bool,
    pub category: FilterCategory,
    pub is_enabled: bool,
    pub created_by: Option<i32>,
    pub created_at: DateTime,
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::CreatedBy",
        to = "super::users::Column::Id",
        on_update = "NoAction",
        on_delete = "SetNull"
    )]
    CreatedByUser,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CreatedByUser.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
