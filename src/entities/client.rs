use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A registered antivirus installation. Rows are created on the first log
/// batch from an unknown clientId and upserted on every batch after that;
/// the core never hard-deletes them.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "clients")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique, indexed)]
    pub client_id: String,
    pub hostname: String,
    pub version: String,
    pub os: String,
    pub last_seen: DateTimeUtc,
    pub is_active: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::log_entry::Entity")]
    LogEntry,
}

impl Related<super::log_entry::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LogEntry.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
