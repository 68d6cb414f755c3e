use sea_orm::{ConnectionTrait, Database, DatabaseConnection};

pub async fn connect(database_url: &str) -> Result<DatabaseConnection, sea_orm::DbErr> {
    let db = Database::connect(database_url).await?;
    tracing::info!("connected to the database");

    create_schema(&db).await?;

    Ok(db)
}

/// Derives the three tables from the entity definitions. There is no
/// migration tooling here; the schema is additive-only and created on boot.
pub async fn create_schema(db: &DatabaseConnection) -> Result<(), sea_orm::DbErr> {
    use crate::entities::{alert, client, log_entry};
    use sea_orm::{schema::Schema, sea_query::TableCreateStatement};

    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    // clients first: log_entries references clients.client_id
    let stmts: Vec<TableCreateStatement> = vec![
        schema
            .create_table_from_entity(client::Entity)
            .if_not_exists()
            .to_owned(),
        schema
            .create_table_from_entity(log_entry::Entity)
            .if_not_exists()
            .to_owned(),
        schema
            .create_table_from_entity(alert::Entity)
            .if_not_exists()
            .to_owned(),
    ];

    for stmt in stmts {
        db.execute(builder.build(&stmt)).await?;
    }

    tracing::info!("schema initialized (clients, log_entries, alerts)");
    Ok(())
}
