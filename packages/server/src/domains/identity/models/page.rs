use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::common::{AppError, AppResult};

/// Navigable page. Pages form a tree via `parent_id`; the chain must stay
/// acyclic, which [`Page::set_parent`] enforces by walking ancestors before
/// writing. Hierarchies are loaded flat and reconstructed by the caller.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Page {
    pub id: Uuid,
    pub key: String,
    pub name_en: String,
    pub name_ar: String,
    pub description_en: Option<String>,
    pub description_ar: Option<String>,
    pub parent_id: Option<Uuid>,
    pub nav_type: Option<String>,
    pub nav_order: i32,
    pub show_in_nav: bool,
    pub is_menu_group: bool,
    pub icon: Option<String>,
    pub visible_when: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Page {
    pub async fn find_by_id(id: Uuid, pool: &PgPool) -> AppResult<Self> {
        sqlx::query_as::<_, Self>("SELECT * FROM pages WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("Page", id))
    }

    pub async fn find_by_key(key: &str, pool: &PgPool) -> AppResult<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM pages WHERE key = $1")
            .bind(key)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// All pages, flat, in navigation order. Callers rebuild the tree from
    /// `parent_id`.
    pub async fn list_all(pool: &PgPool) -> AppResult<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM pages ORDER BY nav_order, key")
            .fetch_all(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn insert(&self, pool: &PgPool) -> AppResult<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO pages (
                id, key, name_en, name_ar, description_en, description_ar,
                parent_id, nav_type, nav_order, show_in_nav, is_menu_group,
                icon, visible_when, created_at, updated_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
             RETURNING *",
        )
        .bind(self.id)
        .bind(&self.key)
        .bind(&self.name_en)
        .bind(&self.name_ar)
        .bind(&self.description_en)
        .bind(&self.description_ar)
        .bind(self.parent_id)
        .bind(&self.nav_type)
        .bind(self.nav_order)
        .bind(self.show_in_nav)
        .bind(self.is_menu_group)
        .bind(&self.icon)
        .bind(&self.visible_when)
        .bind(self.created_at)
        .bind(self.updated_at)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    /// Re-parent a page, rejecting any assignment that would close a cycle.
    pub async fn set_parent(id: Uuid, parent_id: Option<Uuid>, pool: &PgPool) -> AppResult<Self> {
        if let Some(new_parent) = parent_id {
            if new_parent == id {
                return Err(AppError::validation("a page cannot be its own parent"));
            }
            // Walk the ancestor chain of the proposed parent.
            let mut cursor = Some(new_parent);
            while let Some(current) = cursor {
                if current == id {
                    return Err(AppError::validation(
                        "page parent assignment would create a cycle",
                    ));
                }
                cursor = sqlx::query_scalar::<_, Option<Uuid>>(
                    "SELECT parent_id FROM pages WHERE id = $1",
                )
                .bind(current)
                .fetch_optional(pool)
                .await?
                .flatten();
            }
        }
        sqlx::query_as::<_, Self>(
            "UPDATE pages SET parent_id = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(parent_id)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }
}
