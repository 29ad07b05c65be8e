//! Settings repository: JSON documents stored by key

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{Pool, Sqlite};

use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct SettingsRepository {
    pool: Pool<Sqlite>,
}

impl SettingsRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> AppResult<Option<T>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        value
            .map(|v| serde_json::from_str(&v))
            .transpose()
            .map_err(|e| AppError::Internal(format!("Corrupt setting {}: {}", key, e)))
    }

    pub async fn put<T: Serialize>(&self, key: &str, value: &T, at: DateTime<Utc>) -> AppResult<()> {
        let json = serde_json::to_string(value)
            .map_err(|e| AppError::Internal(format!("Failed to encode setting {}: {}", key, e)))?;

        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(json)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
