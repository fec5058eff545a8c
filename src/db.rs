use sea_orm::sea_query::TableCreateStatement;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection,
    DbBackend, DbErr, EntityTrait, PaginatorTrait, QueryFilter, Schema, Set, Statement,
};
use std::time::Duration;
use tracing::info;

use crate::config::{BootstrapConfig, DatabaseConfig};
use crate::entity::role::RoleKind;
use crate::entity::user::UserStatus;
use crate::entity::{
    activity, department, document, document_type, document_version, folder, notification, role,
    share, user,
};

/// Initialize database connection and auto-migrate tables
pub async fn init_database(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let database_url = config.connection_url();

    let mut opt = ConnectOptions::new(&database_url);
    if config.is_sqlite() {
        info!("Opening SQLite database: {}", config.path);
        // One writer; sqlite serializes anyway and in-memory databases are per connection
        opt.max_connections(1).min_connections(1);
    } else {
        info!("Connecting to database: {}:{}/{}", config.host, config.port, config.name);
        opt.max_connections(100)
            .min_connections(5)
            .idle_timeout(Duration::from_secs(8))
            .max_lifetime(Duration::from_secs(8))
            .set_schema_search_path("public");
    }
    opt.connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .sqlx_logging(true)
        .sqlx_logging_level(tracing::log::LevelFilter::Debug);

    let db = Database::connect(opt).await?;
    info!("Database connection established");

    auto_migrate(&db).await?;
    ensure_default_roles(&db).await?;

    Ok(db)
}

/// Create missing tables and indexes
pub async fn auto_migrate(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    info!("Running auto-migration for all entities...");

    // 1. Lookup tables
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(role::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(department::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(document_type::Entity)).await?;

    // 2. Accounts and the tree
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(user::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(folder::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(document::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(document_version::Entity)).await?;

    // 3. Grants, audit and notices
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(share::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(activity::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(notification::Entity)).await?;

    ensure_indexes(db, backend).await?;

    info!("Auto-migration completed successfully");
    Ok(())
}

/// Indexes the entity derive cannot express
async fn ensure_indexes(db: &DatabaseConnection, backend: DbBackend) -> Result<(), DbErr> {
    // Both postgres and sqlite accept partial indexes with this syntax
    let statements = [
        "CREATE UNIQUE INDEX IF NOT EXISTS ux_fildas_version_number \
         ON fildas_document_version (document_id, version_number)",
        "CREATE UNIQUE INDEX IF NOT EXISTS ux_fildas_share_document \
         ON fildas_share (owner_id, target_user_id, document_id) WHERE document_id IS NOT NULL",
        "CREATE UNIQUE INDEX IF NOT EXISTS ux_fildas_share_folder \
         ON fildas_share (owner_id, target_user_id, folder_id) WHERE folder_id IS NOT NULL",
        "CREATE INDEX IF NOT EXISTS ix_fildas_folder_parent ON fildas_folder (parent_id)",
        "CREATE INDEX IF NOT EXISTS ix_fildas_document_folder ON fildas_document (folder_id)",
        "CREATE INDEX IF NOT EXISTS ix_fildas_share_target ON fildas_share (target_user_id)",
        "CREATE INDEX IF NOT EXISTS ix_fildas_activity_subject \
         ON fildas_activity (subject_type, subject_id)",
        "CREATE INDEX IF NOT EXISTS ix_fildas_notification_user ON fildas_notification (user_id)",
    ];

    for sql in statements {
        db.execute(Statement::from_string(backend, sql.to_string())).await?;
    }

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

/// Seed the three built-in roles
pub async fn ensure_default_roles(db: &DatabaseConnection) -> Result<(), DbErr> {
    for kind in RoleKind::ALL {
        let exists = role::Entity::find()
            .filter(role::Column::Name.eq(kind.as_str()))
            .one(db)
            .await?
            .is_some();
        if exists {
            continue;
        }

        role::ActiveModel {
            name: Set(kind.as_str().to_string()),
            description: Set(Some(kind.description().to_string())),
            ..Default::default()
        }
        .insert(db)
        .await?;
        info!("Created default role: {}", kind.as_str());
    }

    Ok(())
}

/// Create the first Super Admin when the user table is empty
pub async fn ensure_bootstrap_admin(
    db: &DatabaseConnection,
    bootstrap: &BootstrapConfig,
) -> anyhow::Result<()> {
    if user::Entity::find().count(db).await? > 0 {
        return Ok(());
    }

    let super_admin = role::Entity::find()
        .filter(role::Column::Name.eq(RoleKind::SuperAdmin.as_str()))
        .one(db)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Super Admin role missing"))?;

    let password = bcrypt::hash(&bootstrap.admin_password, bcrypt::DEFAULT_COST)?;

    user::ActiveModel {
        name: Set(bootstrap.admin_name.clone()),
        email: Set(bootstrap.admin_email.trim().to_lowercase()),
        password: Set(password),
        role_id: Set(Some(super_admin.id)),
        department_id: Set(None),
        status: Set(UserStatus::Active.into()),
        last_login: Set(0),
        created_at: Set(chrono::Utc::now().timestamp()),
        deleted_at: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!("Created bootstrap administrator: {}", bootstrap.admin_email);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::memory_db;

    #[tokio::test]
    async fn test_migration_is_idempotent() {
        let db = memory_db().await;
        auto_migrate(&db).await.unwrap();
        ensure_default_roles(&db).await.unwrap();
        assert_eq!(role::Entity::find().count(&db).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_bootstrap_admin_created_once() {
        let db = memory_db().await;
        let bootstrap = BootstrapConfig {
            admin_name: "Root".to_string(),
            admin_email: "root@example.org".to_string(),
            admin_password: "secret".to_string(),
        };
        ensure_bootstrap_admin(&db, &bootstrap).await.unwrap();
        ensure_bootstrap_admin(&db, &bootstrap).await.unwrap();

        let users = user::Entity::find().all(&db).await.unwrap();
        assert_eq!(users.len(), 1);
        assert!(bcrypt::verify("secret", &users[0].password).unwrap());
    }
}
