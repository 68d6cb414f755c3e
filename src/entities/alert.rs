use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// An alert synthesized from a single ERROR or CRITICAL log entry.
/// `resolved` is flipped by an external resolution action, never by the core.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "alerts")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(indexed)]
    pub log_entry_id: i64,
    #[sea_orm(indexed)]
    pub severity: String,
    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub resolved: bool,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::log_entry::Entity",
        from = "Column::LogEntryId",
        to = "super::log_entry::Column::Id"
    )]
    LogEntry,
}

impl Related<super::log_entry::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LogEntry.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
