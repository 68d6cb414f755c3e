use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

use crate::entities::client;

/// A client is online iff it reported within this window. Derived at read
/// time, never stored.
pub const ONLINE_WINDOW_SECS: i64 = 5 * 60;

pub fn is_online(last_seen: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - last_seen < Duration::seconds(ONLINE_WINDOW_SECS)
}

pub fn online_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::seconds(ONLINE_WINDOW_SECS)
}

/// Insert-or-update keyed on the unique client_id. Self-reported attributes
/// may change across agent restarts and upgrades, so every batch overwrites
/// them; last writer wins under concurrent upserts of the same client.
pub async fn upsert_client(
    db: &DatabaseConnection,
    client_id: &str,
    hostname: &str,
    version: &str,
    os: &str,
) -> Result<client::Model, sea_orm::DbErr> {
    let now = Utc::now();

    let record = client::ActiveModel {
        client_id: Set(client_id.to_owned()),
        hostname: Set(hostname.to_owned()),
        version: Set(version.to_owned()),
        os: Set(os.to_owned()),
        last_seen: Set(now),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    client::Entity::insert(record)
        .on_conflict(
            OnConflict::column(client::Column::ClientId)
                .update_columns([
                    client::Column::Hostname,
                    client::Column::Version,
                    client::Column::Os,
                    client::Column::LastSeen,
                    client::Column::IsActive,
                    client::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec(db)
        .await?;

    client::Entity::find()
        .filter(client::Column::ClientId.eq(client_id))
        .one(db)
        .await?
        .ok_or_else(|| sea_orm::DbErr::RecordNotFound(format!("client {client_id} after upsert")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{ConnectOptions, Database};

    #[test]
    fn liveness_boundary_is_five_minutes() {
        let now = Utc::now();
        assert!(is_online(now - Duration::minutes(4), now));
        assert!(!is_online(now - Duration::minutes(5), now));
        assert!(!is_online(now - Duration::minutes(6), now));
    }

    async fn test_db() -> DatabaseConnection {
        let mut options = ConnectOptions::new("sqlite::memory:");
        options.max_connections(1);
        let db = Database::connect(options).await.unwrap();
        crate::db::create_schema(&db).await.unwrap();
        db
    }

    #[tokio::test]
    async fn upsert_is_idempotent_and_refreshes_last_seen() {
        let db = test_db().await;

        let first = upsert_client(&db, "c1", "host-a", "1.0", "linux")
            .await
            .unwrap();
        let second = upsert_client(&db, "c1", "host-b", "1.1", "linux")
            .await
            .unwrap();

        // exactly one row, mutable fields follow the most recent call
        let total = client::Entity::find().all(&db).await.unwrap().len();
        assert_eq!(total, 1);
        assert_eq!(second.client_id, "c1");
        assert_eq!(second.hostname, "host-b");
        assert_eq!(second.version, "1.1");
        assert!(second.last_seen >= first.last_seen);
        assert!(second.is_active);
    }
}
