use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::common::clock;
use crate::common::{AppError, AppResult};

/// Role with bilingual naming. `name_en` is globally unique.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Role {
    pub id: Uuid,
    pub name_en: String,
    pub name_ar: String,
    pub description_en: Option<String>,
    pub description_ar: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn new(name_en: &str, name_ar: &str) -> Self {
        let now = clock::now();
        Self {
            id: clock::db_id(),
            name_en: name_en.to_string(),
            name_ar: name_ar.to_string(),
            description_en: None,
            description_ar: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn find_by_id(id: Uuid, pool: &PgPool) -> AppResult<Self> {
        sqlx::query_as::<_, Self>("SELECT * FROM roles WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("Role", id))
    }

    pub async fn find_by_name_en(name_en: &str, pool: &PgPool) -> AppResult<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM roles WHERE name_en = $1")
            .bind(name_en)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn list_active(pool: &PgPool) -> AppResult<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM roles WHERE is_active = true ORDER BY name_en")
            .fetch_all(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn insert(&self, pool: &PgPool) -> AppResult<Self> {
        if self.name_en.trim().is_empty() || self.name_ar.trim().is_empty() {
            return Err(AppError::validation("role names are required in both languages"));
        }
        sqlx::query_as::<_, Self>(
            "INSERT INTO roles (
                id, name_en, name_ar, description_en, description_ar,
                is_active, created_at, updated_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING *",
        )
        .bind(self.id)
        .bind(&self.name_en)
        .bind(&self.name_ar)
        .bind(&self.description_en)
        .bind(&self.description_ar)
        .bind(self.is_active)
        .bind(self.created_at)
        .bind(self.updated_at)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn set_active(id: Uuid, active: bool, pool: &PgPool) -> AppResult<Self> {
        sqlx::query_as::<_, Self>(
            "UPDATE roles SET is_active = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(active)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }
}
