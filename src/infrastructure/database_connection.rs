// Database connection and pool management
// This module handles the SQLite ingest store using sqlx

use anyhow::{Context, Result};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

fn is_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        if !is_memory(database_url) {
            let db_path = database_url
                .trim_start_matches("sqlite://")
                .trim_start_matches("sqlite:");
            let db_path = db_path.split('?').next().unwrap_or(db_path);

            if let Some(parent) = Path::new(db_path).parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
            }

            // Ensure the database file exists by creating it if necessary
            if !Path::new(db_path).exists() {
                tokio::fs::File::create(db_path)
                    .await
                    .with_context(|| format!("Failed to create database file {db_path}"))?;
            }
        }

        // Every in-memory connection is its own database, so keep exactly one
        let options = if is_memory(database_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(10)
        };
        let pool = options
            .connect(database_url)
            .await
            .with_context(|| format!("Failed to open database {database_url}"))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_ingest_records_sql = r#"
            CREATE TABLE IF NOT EXISTS ingest_records (
                channel TEXT NOT NULL,
                kind TEXT NOT NULL,
                content_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'none',
                failure_count INTEGER NOT NULL DEFAULT 0,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (channel, kind, content_id)
            )
        "#;

        let create_indexes_sql = r#"
            CREATE INDEX IF NOT EXISTS idx_ingest_scope_status ON ingest_records (channel, kind, status);
        "#;

        sqlx::query(create_ingest_records_sql).execute(&self.pool).await?;
        sqlx::query(create_indexes_sql).execute(&self.pool).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_database_connection_creates_file() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("nested").join("test.db");
        let database_url = format!("sqlite:{}", db_path.to_string_lossy());

        let db = DatabaseConnection::new(&database_url).await?;

        assert!(!db.pool().is_closed());
        assert!(db_path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_database_migration() -> Result<()> {
        let db = DatabaseConnection::new("sqlite::memory:").await?;

        db.migrate().await?;
        // Running twice is harmless
        db.migrate().await?;

        let result = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='ingest_records'")
            .fetch_optional(db.pool())
            .await?;

        assert!(result.is_some());
        Ok(())
    }
}
