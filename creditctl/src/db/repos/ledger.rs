use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    db::error::DbResult,
    ledger::{ConsumeRequest, Decision},
    types::AccountId,
};

/// The credit ledger gate.
///
/// `consume` is the only write path for `topup_credits` decrements and usage
/// ledger inserts. Implementations must execute it as one serializable unit of
/// work per account: an exclusive per-account lock (or stronger) held from the
/// balance read to the commit, released on every exit path including errors.
/// Concurrent calls for the same account are totally ordered by lock
/// acquisition; a storage fault rolls back both the ledger insert and the
/// balance decrement.
#[async_trait]
pub trait LedgerRepo: Send + Sync {
    /// Decide and record one unit of paid usage. Policy denials and duplicate
    /// replays come back as [`Decision`] data; only storage faults are `Err`.
    async fn consume(&self, request: &ConsumeRequest) -> DbResult<Decision>;

    /// Count counted-toward-limit records for an account within an inclusive
    /// period. The same count the gate runs internally, exposed read-only.
    async fn counted_usage(
        &self,
        account_id: AccountId,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> DbResult<i64>;
}
