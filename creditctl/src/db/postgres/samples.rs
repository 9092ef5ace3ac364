use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::db::{
    error::DbResult,
    models::{NewSample, ShowcaseSample},
    repos::SampleRepo,
};

pub struct PostgresSampleRepo {
    pool: PgPool,
}

impl PostgresSampleRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn sample_from_row(row: &PgRow) -> ShowcaseSample {
        ShowcaseSample {
            id: row.get("id"),
            title: row.get("title"),
            video_url: row.get("video_url"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl SampleRepo for PostgresSampleRepo {
    async fn create(&self, input: &NewSample) -> DbResult<ShowcaseSample> {
        let row = sqlx::query(
            r#"
            INSERT INTO showcase_samples (id, title, video_url, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, title, video_url, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.title)
        .bind(&input.video_url)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(Self::sample_from_row(&row))
    }

    async fn random(&self) -> DbResult<Option<ShowcaseSample>> {
        let row = sqlx::query(
            "SELECT id, title, video_url, created_at FROM showcase_samples ORDER BY random() LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::sample_from_row))
    }
}
