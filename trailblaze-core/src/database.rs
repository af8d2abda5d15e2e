use libsql::{Builder, Connection, Database};
use std::env;
use tracing::info;

use crate::common::error::{Result, ScraperError};

pub struct DatabaseManager {
    db: Database,
}

impl DatabaseManager {
    /// Open the store named by `database_url`. A `libsql://` URL connects
    /// to a remote instance (auth token from `LIBSQL_AUTH_TOKEN`); any
    /// other value is treated as a local file path.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let db = if database_url.starts_with("libsql://") {
            let auth_token = env::var("LIBSQL_AUTH_TOKEN").map_err(|_| {
                ScraperError::Config(
                    "LIBSQL_AUTH_TOKEN must be set for a remote database".to_string(),
                )
            })?;
            info!("connecting to remote database at {database_url}");
            Builder::new_remote(database_url.to_string(), auth_token)
                .build()
                .await
                .map_err(|e| ScraperError::Repository(format!("failed to connect: {e}")))?
        } else {
            let path = database_url.strip_prefix("file:").unwrap_or(database_url);
            info!("opening local database at {path}");
            Builder::new_local(path)
                .build()
                .await
                .map_err(|e| ScraperError::Repository(format!("failed to open {path}: {e}")))?
        };

        Ok(Self { db })
    }

    pub fn get_connection(&self) -> Result<Connection> {
        self.db
            .connect()
            .map_err(|e| ScraperError::Repository(format!("failed to get connection: {e}")))
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("running database migrations");
        let conn = self.get_connection()?;

        let migrations = [
            include_str!("migrations/001_create_events.sql"),
            include_str!("migrations/002_run_reports_and_indexes.sql"),
        ];
        for (i, sql) in migrations.iter().enumerate() {
            conn.execute_batch(sql).await.map_err(|e| {
                ScraperError::Repository(format!("migration {:03} failed: {e}", i + 1))
            })?;
        }

        info!("database migrations completed");
        Ok(())
    }
}
