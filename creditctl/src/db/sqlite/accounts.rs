use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::parse_uuid;
use crate::{
    db::{
        error::{DbError, DbResult},
        models::{Account, NewAccount},
        repos::AccountRepo,
    },
    types::AccountId,
};

pub struct SqliteAccountRepo {
    pool: SqlitePool,
}

impl SqliteAccountRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn account_from_row(row: &SqliteRow) -> DbResult<Account> {
        Ok(Account {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            name: row.get("name"),
            tier: row.get("tier"),
            topup_credits: row.get("topup_credits"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl AccountRepo for SqliteAccountRepo {
    async fn create(&self, input: &NewAccount) -> DbResult<Account> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO accounts (id, name, tier, topup_credits, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&input.name)
        .bind(&input.tier)
        .bind(input.topup_credits)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Account {
            id,
            name: input.name.clone(),
            tier: input.tier.clone(),
            topup_credits: input.topup_credits,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get(&self, id: AccountId) -> DbResult<Account> {
        let row = sqlx::query(
            "SELECT id, name, tier, topup_credits, created_at, updated_at FROM accounts WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::NotFound)?;

        Self::account_from_row(&row)
    }

    async fn grant_topup(&self, id: AccountId, amount: i64) -> DbResult<Account> {
        let now = Utc::now();
        let updated = sqlx::query(
            "UPDATE accounts SET topup_credits = topup_credits + ?, updated_at = ? WHERE id = ?",
        )
        .bind(amount)
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        self.get(id).await
    }
}

#[cfg(test)]
mod tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;

    async fn create_test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");
        sqlx::migrate!("./migrations/sqlite")
            .run(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    #[test_log::test(tokio::test)]
    async fn create_and_get_roundtrip() {
        let pool = create_test_pool().await;
        let repo = SqliteAccountRepo::new(pool);

        let created = repo
            .create(&NewAccount {
                name: Some("studio seven".to_string()),
                tier: "studio".to_string(),
                topup_credits: 5,
            })
            .await
            .unwrap();

        let fetched = repo.get(created.id).await.unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.name.as_deref(), Some("studio seven"));
        assert_eq!(fetched.tier, "studio");
        assert_eq!(fetched.topup_credits, 5);
    }

    #[test_log::test(tokio::test)]
    async fn get_missing_account_is_not_found() {
        let pool = create_test_pool().await;
        let repo = SqliteAccountRepo::new(pool);

        let err = repo.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound));
    }

    #[test_log::test(tokio::test)]
    async fn grant_topup_accumulates() {
        let pool = create_test_pool().await;
        let repo = SqliteAccountRepo::new(pool);

        let account = repo
            .create(&NewAccount {
                name: None,
                tier: "free".to_string(),
                topup_credits: 0,
            })
            .await
            .unwrap();

        let after_first = repo.grant_topup(account.id, 10).await.unwrap();
        assert_eq!(after_first.topup_credits, 10);

        let after_second = repo.grant_topup(account.id, 4).await.unwrap();
        assert_eq!(after_second.topup_credits, 14);
    }

    #[test_log::test(tokio::test)]
    async fn grant_topup_on_missing_account_is_not_found() {
        let pool = create_test_pool().await;
        let repo = SqliteAccountRepo::new(pool);

        let err = repo.grant_topup(Uuid::new_v4(), 5).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound));
    }
}
