use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One log record reported by an agent. Immutable once stored; written only
/// by the intake path. `entry_key` is assigned at intake so derived records
/// can reference a row without a timestamp/message lookup.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "log_entries")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub entry_key: Uuid,
    #[sea_orm(indexed)]
    pub client_id: String,
    #[sea_orm(indexed)]
    pub timestamp: DateTimeUtc,
    #[sea_orm(indexed)]
    pub level: String,
    pub logger: String,
    #[sea_orm(column_type = "Text")]
    pub message: String,
    pub module: Option<String>,
    pub function: Option<String>,
    pub line: Option<i32>,
    #[sea_orm(indexed)]
    pub component: Option<String>,
    pub metadata: Option<Json>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::client::Entity",
        from = "Column::ClientId",
        to = "super::client::Column::ClientId"
    )]
    Client,
    #[sea_orm(has_many = "super::alert::Entity")]
    Alert,
}

impl Related<super::client::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Client.def()
    }
}

impl Related<super::alert::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Alert.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
