//! System alert repository.
//!
//! The control loop only appends; the read/resolved flags are flipped by
//! explicit operator acknowledgment through the host API layer.

use anyhow::Result;
use chrono::Utc;
use ltv_guard_core::models::SystemAlert;
use sqlx::PgPool;

use crate::models::AlertRecord;

#[derive(Debug, Clone)]
pub struct AlertRepository {
    pool: PgPool,
}

impl AlertRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Appends one alert and returns its id.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn append(&self, alert: &SystemAlert) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO system_alerts
                (owner_id, kind, severity, title, message, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(alert.owner_id)
        .bind(&alert.kind)
        .bind(alert.severity.as_str())
        .bind(&alert.title)
        .bind(&alert.message)
        .bind(alert.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// Lists unread alerts for an owner, newest first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn unread(&self, owner_id: i64) -> Result<Vec<AlertRecord>> {
        let records = sqlx::query_as::<_, AlertRecord>(
            r#"
            SELECT id, owner_id, kind, severity, title, message,
                   is_read, is_resolved, created_at, resolved_at
            FROM system_alerts
            WHERE owner_id = $1 AND NOT is_read
            ORDER BY created_at DESC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Marks an alert as read.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn mark_read(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE system_alerts SET is_read = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Marks an alert as resolved.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn mark_resolved(&self, id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE system_alerts SET is_resolved = TRUE, resolved_at = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
