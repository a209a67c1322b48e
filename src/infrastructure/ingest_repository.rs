//! Ingest status stores
//!
//! `SqliteIngestRepository` keeps one row per (channel, kind, content id).
//! `InMemoryIngestRepository` honours the same contract for dry runs and tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tokio::sync::RwLock;

use crate::domain::ingest::{IngestRecord, IngestScope, IngestStatus};
use crate::domain::repositories::IngestRepository;

/// Statuses stored in the database that gate reprocessing
const PROCESSED_STATUSES: [IngestStatus; 3] = [IngestStatus::Scraped, IngestStatus::Uploaded, IngestStatus::Unavailable];

#[derive(Clone)]
pub struct SqliteIngestRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteIngestRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    fn row_to_record(row: &SqliteRow) -> Result<IngestRecord> {
        let status: String = row.try_get("status")?;
        let failure_count: i64 = row.try_get("failure_count")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;
        Ok(IngestRecord {
            content_id: row.try_get("content_id")?,
            status: status.parse().map_err(|e: String| anyhow!(e))?,
            failure_count: u32::try_from(failure_count).unwrap_or(u32::MAX),
            updated_at,
        })
    }
}

#[async_trait]
impl IngestRepository for SqliteIngestRepository {
    async fn find(&self, scope: &IngestScope, content_id: &str) -> Result<Option<IngestRecord>> {
        let row = sqlx::query(
            r#"
            SELECT content_id, status, failure_count, updated_at
            FROM ingest_records
            WHERE channel = ? AND kind = ? AND content_id = ?
            "#,
        )
        .bind(&scope.channel)
        .bind(scope.kind.as_str())
        .bind(content_id)
        .fetch_optional(&*self.pool)
        .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn save(&self, scope: &IngestScope, record: &IngestRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO ingest_records
            (channel, kind, content_id, status, failure_count, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&scope.channel)
        .bind(scope.kind.as_str())
        .bind(&record.content_id)
        .bind(record.status.as_str())
        .bind(i64::from(record.failure_count))
        .bind(record.updated_at)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    async fn processed_ids(&self, scope: &IngestScope) -> Result<HashSet<String>> {
        let rows = sqlx::query(
            r#"
            SELECT content_id FROM ingest_records
            WHERE channel = ? AND kind = ? AND status IN (?, ?, ?)
            "#,
        )
        .bind(&scope.channel)
        .bind(scope.kind.as_str())
        .bind(PROCESSED_STATUSES[0].as_str())
        .bind(PROCESSED_STATUSES[1].as_str())
        .bind(PROCESSED_STATUSES[2].as_str())
        .fetch_all(&*self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("content_id").map_err(anyhow::Error::from))
            .collect()
    }

    async fn status_counts(&self, scope: &IngestScope) -> Result<HashMap<IngestStatus, u64>> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS total FROM ingest_records
            WHERE channel = ? AND kind = ?
            GROUP BY status
            "#,
        )
        .bind(&scope.channel)
        .bind(scope.kind.as_str())
        .fetch_all(&*self.pool)
        .await?;

        let mut counts = HashMap::new();
        for row in rows {
            let status: String = row.try_get("status")?;
            let total: i64 = row.try_get("total")?;
            let status: IngestStatus = status.parse().map_err(|e: String| anyhow!(e))?;
            counts.insert(status, u64::try_from(total).unwrap_or_default());
        }
        Ok(counts)
    }
}

/// Process-local ingest store
#[derive(Debug, Default)]
pub struct InMemoryIngestRepository {
    records: RwLock<HashMap<IngestScope, HashMap<String, IngestRecord>>>,
}

impl InMemoryIngestRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record, e.g. an item already uploaded by another process
    pub async fn insert(&self, scope: &IngestScope, record: IngestRecord) {
        self.records
            .write()
            .await
            .entry(scope.clone())
            .or_default()
            .insert(record.content_id.clone(), record);
    }
}

#[async_trait]
impl IngestRepository for InMemoryIngestRepository {
    async fn find(&self, scope: &IngestScope, content_id: &str) -> Result<Option<IngestRecord>> {
        Ok(self
            .records
            .read()
            .await
            .get(scope)
            .and_then(|records| records.get(content_id))
            .cloned())
    }

    async fn save(&self, scope: &IngestScope, record: &IngestRecord) -> Result<()> {
        self.insert(scope, record.clone()).await;
        Ok(())
    }

    async fn processed_ids(&self, scope: &IngestScope) -> Result<HashSet<String>> {
        Ok(self
            .records
            .read()
            .await
            .get(scope)
            .map(|records| {
                records
                    .values()
                    .filter(|record| record.status.blocks_reprocessing())
                    .map(|record| record.content_id.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn status_counts(&self, scope: &IngestScope) -> Result<HashMap<IngestStatus, u64>> {
        let mut counts = HashMap::new();
        if let Some(records) = self.records.read().await.get(scope) {
            for record in records.values() {
                *counts.entry(record.status).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }
}
