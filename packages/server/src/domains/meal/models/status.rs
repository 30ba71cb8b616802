use sqlx::PgPool;

use crate::common::{AppError, AppResult};

/// Wire-stable meal request status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    OnProgress,
}

impl RequestStatus {
    pub fn id(self) -> i32 {
        match self {
            Self::Pending => 1,
            Self::Approved => 2,
            Self::Rejected => 3,
            Self::OnProgress => 4,
        }
    }

    pub fn from_id(id: i32) -> AppResult<Self> {
        match id {
            1 => Ok(Self::Pending),
            2 => Ok(Self::Approved),
            3 => Ok(Self::Rejected),
            4 => Ok(Self::OnProgress),
            other => Err(AppError::validation(format!(
                "unknown meal request status id: {other}"
            ))),
        }
    }

    pub fn name_en(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
            Self::OnProgress => "OnProgress",
        }
    }

    /// A closed request can no longer be copied from or deleted into.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

/// Status lookup row with bilingual names for the summary join.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct MealRequestStatus {
    pub id: i32,
    pub name_en: String,
    pub name_ar: String,
}

impl MealRequestStatus {
    pub async fn list(pool: &PgPool) -> AppResult<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM meal_request_statuses ORDER BY id")
            .fetch_all(pool)
            .await
            .map_err(Into::into)
    }
}

/// Meal type lookup (breakfast, lunch, ...), maintained by administrators.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct MealType {
    pub id: i32,
    pub name_en: String,
    pub name_ar: String,
    pub is_active: bool,
}

impl MealType {
    pub async fn find_by_id(id: i32, pool: &PgPool) -> AppResult<Self> {
        sqlx::query_as::<_, Self>("SELECT * FROM meal_types WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("MealType", id))
    }

    pub async fn list_active(pool: &PgPool) -> AppResult<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM meal_types WHERE is_active = true ORDER BY id",
        )
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }
}

/// Seed the status lookup with its canonical rows.
pub async fn seed_statuses(pool: &PgPool) -> AppResult<()> {
    let statuses = [
        (RequestStatus::Pending, "قيد الانتظار"),
        (RequestStatus::Approved, "موافق عليه"),
        (RequestStatus::Rejected, "مرفوض"),
        (RequestStatus::OnProgress, "قيد الإنشاء"),
    ];
    for (status, name_ar) in statuses {
        sqlx::query(
            "INSERT INTO meal_request_statuses (id, name_en, name_ar)
             VALUES ($1, $2, $3)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(status.id())
        .bind(status.name_en())
        .bind(name_ar)
        .execute(pool)
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_ids_are_wire_stable() {
        assert_eq!(RequestStatus::Pending.id(), 1);
        assert_eq!(RequestStatus::Approved.id(), 2);
        assert_eq!(RequestStatus::Rejected.id(), 3);
        assert_eq!(RequestStatus::OnProgress.id(), 4);
    }

    #[test]
    fn from_id_round_trips() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Approved,
            RequestStatus::Rejected,
            RequestStatus::OnProgress,
        ] {
            assert_eq!(RequestStatus::from_id(status.id()).expect("round trip"), status);
        }
        assert!(RequestStatus::from_id(99).is_err());
    }
}
