//! Stored model-provider credential/config records backing the registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::error::{AppError, Result};

/// One configured provider. `api_key` never leaves the process.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProviderRecord {
    pub id: i64,
    pub name: String,
    pub provider_type: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub api_base_url: Option<String>,
    pub default_model: String,
    pub default_embedding_model: Option<String>,
    pub request_timeout_secs: i32,
    pub max_retries: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct LlmProviderStore {
    pool: PgPool,
}

impl LlmProviderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_by_name(&self, name: &str) -> Result<ProviderRecord> {
        let record = sqlx::query_as::<_, ProviderRecord>(
            "SELECT * FROM llm_providers WHERE LOWER(name) = LOWER($1) AND is_active = TRUE",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("LLM provider {}", name)))?;
        Ok(record)
    }

    /// The default provider is simply the first active record.
    pub async fn first_active(&self) -> Result<ProviderRecord> {
        let record = sqlx::query_as::<_, ProviderRecord>(
            "SELECT * FROM llm_providers WHERE is_active = TRUE ORDER BY id LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Active LLM provider".to_string()))?;
        Ok(record)
    }

    pub async fn list_active(&self) -> Result<Vec<ProviderRecord>> {
        let records = sqlx::query_as::<_, ProviderRecord>(
            "SELECT * FROM llm_providers WHERE is_active = TRUE ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}
