use sea_orm::sea_query::{Index, IndexCreateStatement, TableCreateStatement};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, EntityTrait, Schema, Statement};
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::entity::{activity, favorite, file, folder, folder_permission, notification, user};

/// Initialize database connection and auto-migrate tables
pub async fn init_database(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    info!("Connecting to database: {}", redact(&config.url));

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(300))
        .sqlx_logging(true)
        .sqlx_logging_level(tracing::log::LevelFilter::Debug);

    let db = Database::connect(opt).await?;
    info!("Database connection established");

    auto_migrate(&db).await?;

    Ok(db)
}

/// Hide the password part of a connection URL
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            let creds = &url[scheme_end + 3..at];
            match creds.split_once(':') {
                Some((user, _)) => format!("{}{}:***{}", &url[..scheme_end + 3], user, &url[at..]),
                None => url.to_string(),
            }
        }
        _ => url.to_string(),
    }
}

/// Create missing tables and indexes
pub async fn auto_migrate(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    info!("Running auto-migration for all entities...");

    create_table_if_not_exists(db, backend, schema.create_table_from_entity(user::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(folder::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(file::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(folder_permission::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(favorite::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(activity::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(notification::Entity)).await?;

    // Column-level `indexed` attributes
    create_entity_indexes(db, backend, &schema, activity::Entity).await?;
    create_entity_indexes(db, backend, &schema, notification::Entity).await?;

    create_index_if_not_exists(
        db,
        backend,
        Index::create()
            .name("uq_folder_user")
            .table(folder_permission::Entity)
            .col(folder_permission::Column::FolderId)
            .col(folder_permission::Column::UserId)
            .unique()
            .to_owned(),
    )
    .await?;
    create_index_if_not_exists(
        db,
        backend,
        Index::create()
            .name("uq_user_file")
            .table(favorite::Entity)
            .col(favorite::Column::UserId)
            .col(favorite::Column::FileId)
            .unique()
            .to_owned(),
    )
    .await?;
    create_index_if_not_exists(
        db,
        backend,
        Index::create()
            .name("idx_folder_parent")
            .table(folder::Entity)
            .col(folder::Column::ParentId)
            .to_owned(),
    )
    .await?;
    create_index_if_not_exists(
        db,
        backend,
        Index::create()
            .name("idx_file_folder")
            .table(file::Entity)
            .col(file::Column::FolderId)
            .to_owned(),
    )
    .await?;

    info!("Auto-migration completed successfully");
    Ok(())
}

/// Create a table if it doesn't exist
async fn create_table_if_not_exists(
    db: &DatabaseConnection,
    backend: DbBackend,
    mut stmt: TableCreateStatement,
) -> Result<(), DbErr> {
    stmt.if_not_exists();

    let sql = backend.build(&stmt);

    db.execute(Statement::from_string(backend, sql.to_string())).await?;

    Ok(())
}

async fn create_index_if_not_exists(
    db: &DatabaseConnection,
    backend: DbBackend,
    mut stmt: IndexCreateStatement,
) -> Result<(), DbErr> {
    stmt.if_not_exists();

    let sql = backend.build(&stmt);

    db.execute(Statement::from_string(backend, sql.to_string())).await?;

    Ok(())
}

async fn create_entity_indexes<E: EntityTrait>(
    db: &DatabaseConnection,
    backend: DbBackend,
    schema: &Schema,
    entity: E,
) -> Result<(), DbErr> {
    for stmt in schema.create_index_from_entity(entity) {
        create_index_if_not_exists(db, backend, stmt).await?;
    }
    Ok(())
}
