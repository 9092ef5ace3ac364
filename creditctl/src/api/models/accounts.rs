use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{db::models::Account, types::AccountId};

// Request models

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccountCreate {
    /// Display name for dashboards
    pub name: Option<String>,
    /// Subscription tier label (default "free")
    pub tier: Option<String>,
    /// Initial top-up credit balance (default 0)
    pub topup_credits: Option<i64>,
}

/// A top-up credit grant - the API surface of the purchase flow.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TopupGrant {
    /// Number of credits to add; must be positive
    pub credits: i64,
}

/// Query parameters for the usage summary endpoint
#[derive(Debug, Deserialize, IntoParams)]
pub struct UsageQuery {
    /// Inclusive start of the billing period (RFC 3339)
    pub period_start: DateTime<Utc>,
    /// Inclusive end of the billing period (RFC 3339)
    pub period_end: DateTime<Utc>,
}

// Response models

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccountResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: AccountId,
    pub name: Option<String>,
    pub tier: String,
    pub topup_credits: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            name: account.name,
            tier: account.tier,
            topup_credits: account.topup_credits,
            created_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}

/// Counted usage and remaining balances for an account in a period.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UsageSummaryResponse {
    #[schema(value_type = String, format = "uuid")]
    pub account_id: AccountId,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    /// Usage events that counted toward the limit in the period
    pub counted_usage: i64,
    /// Allowance for the account's tier
    pub base_limit: i64,
    /// Allowance left, clamped at zero
    pub base_remaining: i64,
    /// Top-up credits left
    pub topup_remaining: i64,
    pub total_remaining: i64,
}
