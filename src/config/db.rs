use ::anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::ops::Deref;
use std::str::FromStr;

pub struct DB {
    pub pool: SqlitePool,
}

impl DB {
    // Create a single connection pool for SQLx that is shared across the entire application.
    // This prevents the need to open a new connection for every request, which would be wasteful.
    pub async fn new(url: &str, pool_size: u32) -> Result<Self> {
        // sqlx turns on `foreign_keys` for every connection by default
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size)
            .connect_with(options)
            .await?;
        Ok(DB { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

impl Deref for DB {
    type Target = SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}
