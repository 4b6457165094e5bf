pub mod clusters;
pub mod services;
pub mod tags;
pub mod task_definitions;
pub mod tasks;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::DatabaseSettings;

/// Thin wrapper around a `PgPool`. Kept as its own type (rather than a bare
/// type alias) so the store modules can grow connection-scoped helpers
/// without threading `PgPool` through every signature by hand.
#[derive(Clone)]
pub struct Store {
    pub pool: PgPool,
}

impl Store {
    pub async fn connect(settings: &DatabaseSettings) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .connect(&settings.url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// True when `err` is a unique-constraint violation, regardless of which
/// constraint. Used to turn racing inserts into the caller's own "already
/// exists" / idempotent-retry handling rather than a raw 500.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err.as_database_error().and_then(|e| e.code()),
        Some(code) if code == "23505"
    )
}
