use async_trait::async_trait;

use crate::{
    db::{
        error::DbResult,
        models::{Account, NewAccount},
    },
    types::AccountId,
};

/// Account provisioning and the top-up grant surface.
///
/// Nothing here may decrement `topup_credits` - that is the gate's exclusive
/// write path. Grants go through `grant_topup`, the API-side landing point of
/// the external purchase flow.
#[async_trait]
pub trait AccountRepo: Send + Sync {
    async fn create(&self, input: &NewAccount) -> DbResult<Account>;

    async fn get(&self, id: AccountId) -> DbResult<Account>;

    /// Atomically add `amount` (> 0, validated by the caller) to the account's
    /// top-up pool and return the updated row.
    async fn grant_topup(&self, id: AccountId, amount: i64) -> DbResult<Account>;
}
