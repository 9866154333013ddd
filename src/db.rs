use sqlx::{postgres::PgPoolOptions, PgPool};

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Creates the follow-up table if it does not exist yet.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS follow_ups (
                id UUID PRIMARY KEY,
                sale_id TEXT NOT NULL,
                channels TEXT[] NOT NULL DEFAULT '{}',
                notes TEXT NOT NULL DEFAULT '',
                user_email TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS follow_ups_sale_id_idx ON follow_ups (sale_id, created_at DESC)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
