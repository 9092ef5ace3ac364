use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    db::{
        error::{DbError, DbResult},
        models::{Account, NewAccount},
        repos::AccountRepo,
    },
    types::AccountId,
};

pub struct PostgresAccountRepo {
    pool: PgPool,
}

impl PostgresAccountRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn account_from_row(row: &PgRow) -> Account {
        Account {
            id: row.get("id"),
            name: row.get("name"),
            tier: row.get("tier"),
            topup_credits: row.get("topup_credits"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl AccountRepo for PostgresAccountRepo {
    async fn create(&self, input: &NewAccount) -> DbResult<Account> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO accounts (id, name, tier, topup_credits, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, name, tier, topup_credits, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.tier)
        .bind(input.topup_credits)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(Self::account_from_row(&row))
    }

    async fn get(&self, id: AccountId) -> DbResult<Account> {
        let row = sqlx::query(
            "SELECT id, name, tier, topup_credits, created_at, updated_at FROM accounts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(Self::account_from_row(&row))
    }

    async fn grant_topup(&self, id: AccountId, amount: i64) -> DbResult<Account> {
        let row = sqlx::query(
            r#"
            UPDATE accounts SET topup_credits = topup_credits + $2, updated_at = $3
            WHERE id = $1
            RETURNING id, name, tier, topup_credits, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(amount)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(Self::account_from_row(&row))
    }
}
