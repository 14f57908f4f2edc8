use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use futures::{future::BoxFuture, FutureExt};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqlitePool};

use crate::{
    domain::{Alert, Severity},
    monitor::AlertSink,
};

#[derive(Clone)]
pub struct AlertRepository {
    pool: SqlitePool,
}

impl AlertRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Stores the alert and its fingerprint together. Re-recording the same alert is a no-op.
    pub async fn record(&self, alert: &Alert, fingerprint: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"INSERT OR IGNORE INTO alerts
                (id, keyword, source, content, url, created_at, severity, confidence)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
        )
        .bind(&alert.id)
        .bind(&alert.keyword)
        .bind(&alert.source)
        .bind(&alert.content)
        .bind(&alert.url)
        .bind(alert.timestamp)
        .bind(alert.severity.as_str())
        .bind(alert.confidence)
        .execute(&mut *tx)
        .await?;
        sqlx::query(r#"INSERT OR IGNORE INTO seen_hits (fingerprint) VALUES (?1)"#)
            .bind(fingerprint)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn load_fingerprints(&self, limit: usize) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as(r#"SELECT fingerprint FROM seen_hits ORDER BY rowid DESC LIMIT ?1"#)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().rev().map(|(fingerprint,)| fingerprint).collect())
    }

    pub async fn recent(&self, limit: usize) -> Result<Vec<Alert>> {
        let rows = sqlx::query_as::<_, AlertRow>(
            r#"SELECT id, keyword, source, content, url, created_at, severity, confidence
                FROM alerts ORDER BY created_at DESC LIMIT ?1"#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AlertRow::into_alert).collect()
    }
}

impl AlertSink for AlertRepository {
    fn record<'a>(&'a self, alert: &'a Alert, fingerprint: &'a str) -> BoxFuture<'a, Result<()>> {
        AlertRepository::record(self, alert, fingerprint).boxed()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertRow {
    pub id: String,
    pub keyword: String,
    pub source: String,
    pub content: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub severity: String,
    pub confidence: f64,
}

impl AlertRow {
    fn into_alert(self) -> Result<Alert> {
        let severity: Severity = self.severity.parse().map_err(|err: String| anyhow!(err))?;
        Ok(Alert {
            id: self.id,
            keyword: self.keyword,
            source: self.source,
            content: self.content,
            url: self.url,
            timestamp: self.created_at,
            severity,
            confidence: self.confidence,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for AlertRow {
    fn from_row(row: &'r SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            keyword: row.try_get("keyword")?,
            source: row.try_get("source")?,
            content: row.try_get("content")?,
            url: row.try_get("url")?,
            created_at: row.try_get("created_at")?,
            severity: row.try_get("severity")?,
            confidence: row.try_get("confidence")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_pool;

    fn alert(id: &str, severity: Severity) -> Alert {
        Alert {
            id: id.into(),
            keyword: "acme".into(),
            source: "google".into(),
            content: "acme leak".into(),
            url: "https://example.com/".into(),
            timestamp: Utc::now(),
            severity,
            confidence: 0.8,
        }
    }

    #[tokio::test]
    async fn records_alerts_and_fingerprints() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_pool(&dir.path().join("alerts.db")).await.unwrap();
        let repo = AlertRepository::new(pool);

        repo.record(&alert("a1", Severity::High), "fp-1").await.unwrap();
        repo.record(&alert("a2", Severity::Critical), "fp-2").await.unwrap();
        repo.record(&alert("a2", Severity::Critical), "fp-2").await.unwrap();

        assert_eq!(repo.load_fingerprints(10).await.unwrap(), vec!["fp-1", "fp-2"]);
        assert_eq!(repo.load_fingerprints(1).await.unwrap(), vec!["fp-2"]);

        let stored = repo.recent(10).await.unwrap();
        assert_eq!(stored.len(), 2);
        let a1 = stored.iter().find(|a| a.id == "a1").unwrap();
        assert_eq!(a1.severity, Severity::High);
        assert_eq!(a1.confidence, 0.8);
        repo.close().await;
    }
}
