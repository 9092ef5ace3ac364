use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;
use crate::{
    db::{error::DbResult, repos::LedgerRepo},
    ledger::{ConsumeRequest, Decision, Remaining},
    types::AccountId,
};

pub struct SqliteLedgerRepo {
    pool: SqlitePool,
}

impl SqliteLedgerRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Count counted-toward-limit records for an account within the inclusive
/// period, on whatever connection the caller holds (inside or outside the
/// gate's transaction).
async fn counted_usage_on(
    conn: &mut SqliteConnection,
    account_id: AccountId,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
) -> DbResult<i64> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM usage_records
        WHERE account_id = ? AND counted_toward_limit = 1
          AND created_at >= ? AND created_at <= ?
        "#,
    )
    .bind(account_id.to_string())
    .bind(period_start)
    .bind(period_end)
    .fetch_one(&mut *conn)
    .await?;

    Ok(count)
}

#[async_trait]
impl LedgerRepo for SqliteLedgerRepo {
    async fn consume(&self, request: &ConsumeRequest) -> DbResult<Decision> {
        // Take the writer lock before reading so the balance check and the
        // writes below are serialized against other gate calls.
        // Note: SQLite doesn't support FOR UPDATE, so we use BEGIN IMMEDIATE.
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result = async {
            let topup: Option<i64> =
                sqlx::query_scalar("SELECT topup_credits FROM accounts WHERE id = ?")
                    .bind(request.account_id.to_string())
                    .fetch_optional(&mut *conn)
                    .await?;

            let Some(topup_credits) = topup else {
                return Ok(Decision::no_account());
            };

            if request.counted {
                // A counted record with the same dedup key in this period means
                // the unit of work was already billed: report current balances
                // and change nothing.
                let existing: Option<String> = sqlx::query_scalar(
                    r#"
                    SELECT id FROM usage_records
                    WHERE account_id = ? AND dedup_key = ? AND counted_toward_limit = 1
                      AND created_at >= ? AND created_at <= ?
                    ORDER BY created_at
                    LIMIT 1
                    "#,
                )
                .bind(request.account_id.to_string())
                .bind(&request.dedup_key)
                .bind(request.period_start)
                .bind(request.period_end)
                .fetch_optional(&mut *conn)
                .await?;

                if let Some(id) = existing {
                    let record_id = parse_uuid(&id)?;
                    let counted = counted_usage_on(
                        &mut conn,
                        request.account_id,
                        request.period_start,
                        request.period_end,
                    )
                    .await?;
                    let remaining =
                        Remaining::compute(request.base_limit, counted, topup_credits);
                    return Ok(Decision::already_counted(record_id, remaining));
                }
            }

            let counted = counted_usage_on(
                &mut conn,
                request.account_id,
                request.period_start,
                request.period_end,
            )
            .await?;
            let remaining = Remaining::compute(request.base_limit, counted, topup_credits);

            if request.counted && remaining.total() <= 0 {
                return Ok(Decision::limit_reached(remaining));
            }

            // Accepted: the ledger row is written whether or not the event
            // counts toward the limit.
            let record_id = Uuid::new_v4();
            let now = Utc::now();
            sqlx::query(
                r#"
                INSERT INTO usage_records
                    (id, account_id, request_id, dedup_key, video_id, counted_toward_limit, tier, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(record_id.to_string())
            .bind(request.account_id.to_string())
            .bind(&request.request_id)
            .bind(&request.dedup_key)
            .bind(request.video_id.map(|id| id.to_string()))
            .bind(request.counted)
            .bind(&request.tier)
            .bind(now)
            .execute(&mut *conn)
            .await?;

            let mut used_topup = false;
            if request.counted && remaining.base <= 0 && topup_credits > 0 {
                // Conditioned on the balance still being positive at write
                // time, even though the writer lock is held.
                let updated = sqlx::query(
                    "UPDATE accounts SET topup_credits = topup_credits - 1, updated_at = ? \
                     WHERE id = ? AND topup_credits > 0",
                )
                .bind(now)
                .bind(request.account_id.to_string())
                .execute(&mut *conn)
                .await?;
                used_topup = updated.rows_affected() == 1;
            }

            // Recompute remainders from final state instead of adjusting the
            // pre-insert figures arithmetically.
            let counted_after = counted_usage_on(
                &mut conn,
                request.account_id,
                request.period_start,
                request.period_end,
            )
            .await?;
            let topup_after: i64 =
                sqlx::query_scalar("SELECT topup_credits FROM accounts WHERE id = ?")
                    .bind(request.account_id.to_string())
                    .fetch_one(&mut *conn)
                    .await?;
            let remaining_after =
                Remaining::compute(request.base_limit, counted_after, topup_after);

            Ok(Decision::accepted(record_id, used_topup, remaining_after))
        }
        .await;

        // Commit or rollback based on result; either way the writer lock is
        // released before returning.
        match &result {
            Ok(_) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
            }
            Err(_) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
            }
        }

        result
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

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

    use super::*;
    use crate::{
        db::{models::NewAccount, repos::AccountRepo, sqlite::SqliteAccountRepo},
        ledger::DecisionReason,
    };

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

    async fn create_account(pool: &SqlitePool, topup_credits: i64) -> AccountId {
        let accounts = SqliteAccountRepo::new(pool.clone());
        let account = accounts
            .create(&NewAccount {
                name: Some("test account".to_string()),
                tier: "creator".to_string(),
                topup_credits,
            })
            .await
            .expect("Failed to create account");
        account.id
    }

    fn request(account_id: AccountId, dedup_key: &str, base_limit: i64) -> ConsumeRequest {
        let now = Utc::now();
        ConsumeRequest {
            account_id,
            dedup_key: dedup_key.to_string(),
            request_id: format!("req-{dedup_key}"),
            tier: "creator".to_string(),
            base_limit,
            period_start: now - Duration::hours(1),
            period_end: now + Duration::hours(1),
            video_id: None,
            counted: true,
        }
    }

    #[test_log::test(tokio::test)]
    async fn missing_account_is_denied_without_writes() {
        let pool = create_test_pool().await;
        let ledger = SqliteLedgerRepo::new(pool.clone());
        let ghost = Uuid::new_v4();

        let decision = ledger.consume(&request(ghost, "vid-1", 3)).await.unwrap();

        assert!(!decision.allowed);
        assert_eq!(decision.reason, DecisionReason::NoAccount);
        assert!(decision.usage_record_id.is_none());

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM usage_records")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[test_log::test(tokio::test)]
    async fn accepts_until_base_limit_reached() {
        let pool = create_test_pool().await;
        let ledger = SqliteLedgerRepo::new(pool.clone());
        let account_id = create_account(&pool, 0).await;

        for (i, expected_base_remaining) in [(0, 2i64), (1, 1), (2, 0)] {
            let decision = ledger
                .consume(&request(account_id, &format!("vid-{i}"), 3))
                .await
                .unwrap();
            assert!(decision.allowed, "call {i} should be allowed");
            assert_eq!(decision.reason, DecisionReason::Ok);
            assert!(!decision.used_topup);
            assert_eq!(decision.base_remaining, expected_base_remaining);
            assert_eq!(decision.total_remaining, expected_base_remaining);
        }

        let denied = ledger.consume(&request(account_id, "vid-3", 3)).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.reason, DecisionReason::LimitReached);
        assert!(denied.usage_record_id.is_none());
        assert_eq!(denied.total_remaining, 0);

        // The denied call must not have grown the ledger.
        let req = request(account_id, "unused", 3);
        let counted = ledger
            .counted_usage(account_id, req.period_start, req.period_end)
            .await
            .unwrap();
        assert_eq!(counted, 3);
    }

    #[test_log::test(tokio::test)]
    async fn duplicate_submission_is_idempotent() {
        let pool = create_test_pool().await;
        let ledger = SqliteLedgerRepo::new(pool.clone());
        let account_id = create_account(&pool, 0).await;

        let first = ledger.consume(&request(account_id, "vid-1", 3)).await.unwrap();
        assert!(first.allowed);
        assert!(!first.deduplicated);

        // Same dedup key, same period: the refresh case.
        let replay = ledger.consume(&request(account_id, "vid-1", 3)).await.unwrap();
        assert!(replay.allowed);
        assert_eq!(replay.reason, DecisionReason::AlreadyCounted);
        assert!(replay.deduplicated);
        assert!(!replay.used_topup);
        assert_eq!(replay.usage_record_id, first.usage_record_id);
        assert_eq!(replay.base_remaining, first.base_remaining);

        let req = request(account_id, "unused", 3);
        let counted = ledger
            .counted_usage(account_id, req.period_start, req.period_end)
            .await
            .unwrap();
        assert_eq!(counted, 1, "replay must not create a second counted row");
    }

    #[test_log::test(tokio::test)]
    async fn base_allowance_is_consumed_before_topup() {
        let pool = create_test_pool().await;
        let ledger = SqliteLedgerRepo::new(pool.clone());
        let account_id = create_account(&pool, 2).await;

        let first = ledger.consume(&request(account_id, "vid-0", 1)).await.unwrap();
        assert!(first.allowed);
        assert!(!first.used_topup, "base allowance goes first");
        assert_eq!(first.topup_remaining, 2);

        let second = ledger.consume(&request(account_id, "vid-1", 1)).await.unwrap();
        assert!(second.allowed);
        assert!(second.used_topup);
        assert_eq!(second.base_remaining, 0);
        assert_eq!(second.topup_remaining, 1);

        let third = ledger.consume(&request(account_id, "vid-2", 1)).await.unwrap();
        assert!(third.allowed);
        assert!(third.used_topup);
        assert_eq!(third.topup_remaining, 0);

        let fourth = ledger.consume(&request(account_id, "vid-3", 1)).await.unwrap();
        assert!(!fourth.allowed);
        assert_eq!(fourth.reason, DecisionReason::LimitReached);
    }

    #[test_log::test(tokio::test)]
    async fn uncounted_events_bypass_limits_but_are_recorded() {
        let pool = create_test_pool().await;
        let ledger = SqliteLedgerRepo::new(pool.clone());
        // Fully exhausted account: no allowance, no top-up.
        let account_id = create_account(&pool, 0).await;

        let mut uncounted = request(account_id, "cache-hit", 0);
        uncounted.counted = false;

        let first = ledger.consume(&uncounted).await.unwrap();
        assert!(first.allowed);
        assert_eq!(first.reason, DecisionReason::Ok);
        assert!(!first.used_topup);
        assert!(first.usage_record_id.is_some());

        // Uncounted events are exempt from the dedup short-circuit: the same
        // key again inserts a fresh row.
        let second = ledger.consume(&uncounted).await.unwrap();
        assert!(second.allowed);
        assert!(!second.deduplicated);
        assert_ne!(second.usage_record_id, first.usage_record_id);

        let rows: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM usage_records WHERE counted_toward_limit = 0",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(rows, 2);

        // A counted call is still denied - uncounted rows don't consume and
        // don't count.
        let counted = ledger.consume(&request(account_id, "vid-1", 0)).await.unwrap();
        assert!(!counted.allowed);
        assert_eq!(counted.reason, DecisionReason::LimitReached);
    }

    #[test_log::test(tokio::test)]
    async fn base_remaining_clamps_when_limit_shrinks_mid_period() {
        let pool = create_test_pool().await;
        let ledger = SqliteLedgerRepo::new(pool.clone());
        let account_id = create_account(&pool, 0).await;

        for i in 0..3 {
            ledger
                .consume(&request(account_id, &format!("vid-{i}"), 3))
                .await
                .unwrap();
        }

        // The account downgraded: the limit is now 1 with 3 usages in-period.
        let denied = ledger.consume(&request(account_id, "vid-9", 1)).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.base_remaining, 0, "never reported negative");
        assert_eq!(denied.total_remaining, 0);
    }

    #[test_log::test(tokio::test)]
    async fn dedup_is_scoped_to_the_period() {
        let pool = create_test_pool().await;
        let ledger = SqliteLedgerRepo::new(pool.clone());
        let account_id = create_account(&pool, 0).await;

        let first = ledger.consume(&request(account_id, "vid-1", 3)).await.unwrap();
        assert!(first.allowed);

        // Same dedup key, next billing period: a fresh unit of work.
        let now = Utc::now();
        let mut next_period = request(account_id, "vid-1", 3);
        next_period.period_start = now + Duration::hours(2);
        next_period.period_end = now + Duration::hours(4);

        let decision = ledger.consume(&next_period).await.unwrap();
        assert!(decision.allowed);
        assert!(!decision.deduplicated);
        assert_ne!(decision.usage_record_id, first.usage_record_id);
    }

    /// Shared-file pool so concurrent gate calls contend on real writer locks
    /// rather than serializing on a single pooled connection.
    async fn create_shared_test_pool(dir: &tempfile::TempDir) -> SqlitePool {
        let options = SqliteConnectOptions::new()
            .filename(dir.path().join("creditctl-test.db"))
            .create_if_missing(true)
            .busy_timeout(std::time::Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .expect("Failed to create file-backed SQLite pool");
        sqlx::migrate!("./migrations/sqlite")
            .run(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    #[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
    async fn concurrent_calls_accept_exactly_the_limit() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_shared_test_pool(&dir).await;
        let ledger = Arc::new(SqliteLedgerRepo::new(pool.clone()));
        let account_id = create_account(&pool, 0).await;

        let mut handles = Vec::new();
        for i in 0..6 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .consume(&request(account_id, &format!("vid-{i}"), 2))
                    .await
            }));
        }

        let mut allowed = 0;
        let mut denied = 0;
        for handle in handles {
            let decision = handle.await.unwrap().unwrap();
            match decision.reason {
                DecisionReason::Ok => allowed += 1,
                DecisionReason::LimitReached => denied += 1,
                other => panic!("unexpected reason {other:?}"),
            }
        }
        assert_eq!(allowed, 2, "exactly base_limit acceptances");
        assert_eq!(denied, 4);

        let req = request(account_id, "unused", 2);
        let counted = ledger
            .counted_usage(account_id, req.period_start, req.period_end)
            .await
            .unwrap();
        assert_eq!(counted, 2);
    }

    #[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
    async fn concurrent_topup_spends_have_no_lost_updates() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_shared_test_pool(&dir).await;
        let ledger = Arc::new(SqliteLedgerRepo::new(pool.clone()));
        let account_id = create_account(&pool, 3).await;

        let mut handles = Vec::new();
        for i in 0..6 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .consume(&request(account_id, &format!("vid-{i}"), 0))
                    .await
            }));
        }

        let mut allowed = 0;
        for handle in handles {
            let decision = handle.await.unwrap().unwrap();
            if decision.allowed {
                assert!(decision.used_topup);
                allowed += 1;
            }
        }
        assert_eq!(allowed, 3, "one acceptance per top-up credit");

        let balance: i64 = sqlx::query_scalar("SELECT topup_credits FROM accounts WHERE id = ?")
            .bind(account_id.to_string())
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(balance, 0, "drained exactly to zero, never negative");
    }
}
