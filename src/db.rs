use anyhow::{Context, Result, anyhow};
use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;

use crate::auth::password::hash_password;
use crate::config::Config;
use crate::model::role::Role;

pub async fn init_db(config: &Config) -> Result<MySqlPool> {
    let pool = MySqlPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    if config.run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to apply migrations")?;
        tracing::info!("Database migrations applied");
    }

    Ok(pool)
}

/// Creates the `HQ` business unit and its first admin when no user exists yet.
pub async fn bootstrap_admin(pool: &MySqlPool, username: &str, password: &str) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&mut *tx)
        .await?;
    if users > 0 {
        return Ok(false);
    }

    let hashed = hash_password(password).map_err(|e| anyhow!("Failed to hash bootstrap password: {e}"))?;

    sqlx::query("INSERT IGNORE INTO business_units (code, name) VALUES ('HQ', 'Head Office')")
        .execute(&mut *tx)
        .await?;
    let unit_id: u64 = sqlx::query_scalar("SELECT id FROM business_units WHERE code = 'HQ'")
        .fetch_one(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO users (business_unit_id, username, password, full_name, role_id)
        VALUES (?, ?, ?, 'Administrator', ?)
        "#,
    )
    .bind(unit_id)
    .bind(username.trim().to_lowercase())
    .bind(hashed)
    .bind(Role::Admin.id())
    .execute(&mut *tx)
    .await
    .context("Failed to create bootstrap admin")?;

    tx.commit().await?;
    tracing::info!(username, business_unit_id = unit_id, "Bootstrap admin created");
    Ok(true)
}
