use crate::errors::{AppError, ResultExt};
use crate::models::{FollowUp, FollowUpUpdate, NewFollowUp};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

/// Keyed store of follow-up notes per sale.
#[async_trait]
pub trait FollowUpStore: Send + Sync {
    async fn create_follow_up(
        &self,
        new: NewFollowUp,
        user_email: &str,
    ) -> Result<FollowUp, AppError>;

    /// Follow-ups for one sale, newest first.
    async fn get_follow_ups_by_sale_id(&self, sale_id: &str) -> Result<Vec<FollowUp>, AppError>;

    /// Follow-ups for many sales at once, newest first.
    async fn get_follow_ups_for_sales(&self, sale_ids: &[String]) -> Result<Vec<FollowUp>, AppError>;

    async fn get_follow_up(&self, id: Uuid) -> Result<Option<FollowUp>, AppError>;

    /// Returns `None` when no follow-up has this id.
    async fn update_follow_up(
        &self,
        id: Uuid,
        update: FollowUpUpdate,
    ) -> Result<Option<FollowUp>, AppError>;

    /// Returns whether a row was deleted.
    async fn delete_follow_up(&self, id: Uuid) -> Result<bool, AppError>;
}

/// PostgreSQL-backed follow-up store.
pub struct PgFollowUpStore {
    pool: PgPool,
}

const COLUMNS: &str = "id, sale_id, channels, notes, user_email, created_at";

impl PgFollowUpStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FollowUpStore for PgFollowUpStore {
    async fn create_follow_up(
        &self,
        new: NewFollowUp,
        user_email: &str,
    ) -> Result<FollowUp, AppError> {
        let follow_up = sqlx::query_as::<_, FollowUp>(&format!(
            "INSERT INTO follow_ups (id, sale_id, channels, notes, user_email)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {}",
            COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&new.sale_id)
        .bind(&new.channels)
        .bind(&new.notes)
        .bind(user_email)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("creating follow-up for sale {}", new.sale_id))?;

        tracing::info!(
            "Created follow-up {} for sale {} by {}",
            follow_up.id,
            follow_up.sale_id,
            user_email
        );
        Ok(follow_up)
    }

    async fn get_follow_ups_by_sale_id(&self, sale_id: &str) -> Result<Vec<FollowUp>, AppError> {
        let follow_ups = sqlx::query_as::<_, FollowUp>(&format!(
            "SELECT {} FROM follow_ups WHERE sale_id = $1 ORDER BY created_at DESC",
            COLUMNS
        ))
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(follow_ups)
    }

    async fn get_follow_ups_for_sales(&self, sale_ids: &[String]) -> Result<Vec<FollowUp>, AppError> {
        if sale_ids.is_empty() {
            return Ok(Vec::new());
        }

        let follow_ups = sqlx::query_as::<_, FollowUp>(&format!(
            "SELECT {} FROM follow_ups WHERE sale_id = ANY($1) ORDER BY created_at DESC",
            COLUMNS
        ))
        .bind(sale_ids)
        .fetch_all(&self.pool)
        .await
        .context("loading follow-ups for dashboard")?;

        Ok(follow_ups)
    }

    async fn get_follow_up(&self, id: Uuid) -> Result<Option<FollowUp>, AppError> {
        let follow_up = sqlx::query_as::<_, FollowUp>(&format!(
            "SELECT {} FROM follow_ups WHERE id = $1",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(follow_up)
    }

    async fn update_follow_up(
        &self,
        id: Uuid,
        update: FollowUpUpdate,
    ) -> Result<Option<FollowUp>, AppError> {
        let follow_up = sqlx::query_as::<_, FollowUp>(&format!(
            "UPDATE follow_ups
             SET channels = COALESCE($2, channels),
                 notes = COALESCE($3, notes)
             WHERE id = $1
             RETURNING {}",
            COLUMNS
        ))
        .bind(id)
        .bind(update.channels)
        .bind(update.notes)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("updating follow-up {}", id))?;

        Ok(follow_up)
    }

    async fn delete_follow_up(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM follow_ups WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
