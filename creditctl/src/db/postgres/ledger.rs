use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    db::{error::DbResult, repos::LedgerRepo},
    ledger::{ConsumeRequest, Decision, Remaining},
    types::AccountId,
};

pub struct PostgresLedgerRepo {
    pool: PgPool,
}

impl PostgresLedgerRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Count counted-toward-limit records for an account within the inclusive
/// period, on whatever connection the caller holds (inside or outside the
/// gate's transaction).
async fn counted_usage_on(
    conn: &mut PgConnection,
    account_id: AccountId,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
) -> DbResult<i64> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM usage_records
        WHERE account_id = $1 AND counted_toward_limit
          AND created_at >= $2 AND created_at <= $3
        "#,
    )
    .bind(account_id)
    .bind(period_start)
    .bind(period_end)
    .fetch_one(&mut *conn)
    .await?;

    Ok(count)
}

#[async_trait]
impl LedgerRepo for PostgresLedgerRepo {
    async fn consume(&self, request: &ConsumeRequest) -> DbResult<Decision> {
        let mut tx = self.pool.begin().await?;

        // Exclusive lock on the account row for the whole unit of work. Other
        // gate calls for this account block here; other accounts are
        // unaffected.
        let topup: Option<i64> = sqlx::query_scalar(
            "SELECT topup_credits FROM accounts WHERE id = $1 FOR UPDATE",
        )
        .bind(request.account_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(topup_credits) = topup else {
            tx.rollback().await?;
            return Ok(Decision::no_account());
        };

        if request.counted {
            // A counted record with the same dedup key in this period means
            // the unit of work was already billed: report current balances and
            // change nothing.
            let existing: Option<Uuid> = sqlx::query_scalar(
                r#"
                SELECT id FROM usage_records
                WHERE account_id = $1 AND dedup_key = $2 AND counted_toward_limit
                  AND created_at >= $3 AND created_at <= $4
                ORDER BY created_at
                LIMIT 1
                "#,
            )
            .bind(request.account_id)
            .bind(&request.dedup_key)
            .bind(request.period_start)
            .bind(request.period_end)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(record_id) = existing {
                let counted = counted_usage_on(
                    &mut tx,
                    request.account_id,
                    request.period_start,
                    request.period_end,
                )
                .await?;
                let remaining = Remaining::compute(request.base_limit, counted, topup_credits);
                tx.commit().await?;
                return Ok(Decision::already_counted(record_id, remaining));
            }
        }

        let counted = counted_usage_on(
            &mut tx,
            request.account_id,
            request.period_start,
            request.period_end,
        )
        .await?;
        let remaining = Remaining::compute(request.base_limit, counted, topup_credits);

        if request.counted && remaining.total() <= 0 {
            tx.rollback().await?;
            return Ok(Decision::limit_reached(remaining));
        }

        // Accepted: the ledger row is written whether or not the event counts
        // toward the limit.
        let record_id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO usage_records
                (id, account_id, request_id, dedup_key, video_id, counted_toward_limit, tier, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record_id)
        .bind(request.account_id)
        .bind(&request.request_id)
        .bind(&request.dedup_key)
        .bind(request.video_id)
        .bind(request.counted)
        .bind(&request.tier)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let mut used_topup = false;
        if request.counted && remaining.base <= 0 && topup_credits > 0 {
            // Conditioned on the balance still being positive at write time,
            // even though the row is lock-held.
            let updated = sqlx::query(
                "UPDATE accounts SET topup_credits = topup_credits - 1, updated_at = $2 \
                 WHERE id = $1 AND topup_credits > 0",
            )
            .bind(request.account_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            used_topup = updated.rows_affected() == 1;
        }

        // Recompute remainders from final state instead of adjusting the
        // pre-insert figures arithmetically.
        let counted_after = counted_usage_on(
            &mut tx,
            request.account_id,
            request.period_start,
            request.period_end,
        )
        .await?;
        let topup_after: i64 =
            sqlx::query_scalar("SELECT topup_credits FROM accounts WHERE id = $1")
                .bind(request.account_id)
                .fetch_one(&mut *tx)
                .await?;
        let remaining_after = Remaining::compute(request.base_limit, counted_after, topup_after);

        // Either everything above commits or nothing does; a failed commit
        // rolls back both the insert and the decrement.
        tx.commit().await?;
        Ok(Decision::accepted(record_id, used_topup, remaining_after))
    }

    async fn counted_usage(
        &self,
        account_id: AccountId,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        counted_usage_on(&mut conn, account_id, period_start, period_end).await
    }
}
