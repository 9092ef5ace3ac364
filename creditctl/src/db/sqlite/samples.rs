use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::{
    error::DbResult,
    models::{NewSample, ShowcaseSample},
    repos::SampleRepo,
};

pub struct SqliteSampleRepo {
    pool: SqlitePool,
}

impl SqliteSampleRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn sample_from_row(row: &SqliteRow) -> DbResult<ShowcaseSample> {
        Ok(ShowcaseSample {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            title: row.get("title"),
            video_url: row.get("video_url"),
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl SampleRepo for SqliteSampleRepo {
    async fn create(&self, input: &NewSample) -> DbResult<ShowcaseSample> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO showcase_samples (id, title, video_url, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(&input.title)
        .bind(&input.video_url)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(ShowcaseSample {
            id,
            title: input.title.clone(),
            video_url: input.video_url.clone(),
            created_at: now,
        })
    }

    async fn random(&self) -> DbResult<Option<ShowcaseSample>> {
        let row = sqlx::query(
            "SELECT id, title, video_url, created_at FROM showcase_samples ORDER BY RANDOM() LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::sample_from_row).transpose()
    }
}
