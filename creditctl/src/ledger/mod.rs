//! Domain types for the credit ledger gate.
//!
//! The gate decides, for one unit of paid work (one generated video in one
//! billing period), whether to accept and record it. Acceptance draws from a
//! two-tier balance: the subscription tier's base allowance first, then the
//! purchasable top-up pool. The decision itself is plain data - policy denials
//! (`LimitReached`, `NoAccount`) are outcomes, not errors.
//!
//! The actual check-and-deduct sequence runs inside the storage backends (see
//! [`crate::db::repos::LedgerRepo`]); this module holds the types flowing
//! through it and the remainder arithmetic both backends share.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::types::{AccountId, UsageRecordId};

/// Why the gate allowed or denied a usage event. Stored nowhere; returned to
/// the caller on every invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Accepted and recorded.
    Ok,
    /// Duplicate submission of a unit of work already billed this period.
    /// Treated as success so a page refresh never charges twice.
    AlreadyCounted,
    /// Base allowance and top-up pool are both exhausted.
    LimitReached,
    /// The account does not exist; it must be provisioned first.
    NoAccount,
}

/// A request to record one unit of paid usage.
#[derive(Debug, Clone)]
pub struct ConsumeRequest {
    pub account_id: AccountId,
    /// External content id (e.g. the platform video id) used to detect
    /// resubmission of the same unit of work within a period.
    pub dedup_key: String,
    /// Caller correlation id (request or session id), stored for audit.
    pub request_id: String,
    /// Subscription tier label, snapshotted onto the ledger row.
    pub tier: String,
    /// Counted generations granted by the tier before top-up credits are drawn.
    pub base_limit: i64,
    /// Inclusive start of the billing window usage is counted in.
    pub period_start: DateTime<Utc>,
    /// Inclusive end of the billing window.
    pub period_end: DateTime<Utc>,
    /// Optional linked resource (the generated video).
    pub video_id: Option<Uuid>,
    /// Whether this event counts toward the allowance. Uncounted events skip
    /// all balance checks but still land in the ledger (e.g. cache hits).
    pub counted: bool,
}

/// Outcome of one gate invocation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Decision {
    /// Whether the usage event was accepted.
    pub allowed: bool,
    /// Why.
    pub reason: DecisionReason,
    /// The ledger row backing this decision - freshly inserted, or the prior
    /// row when the submission was a duplicate. Absent on denials.
    #[schema(value_type = Option<String>, format = "uuid")]
    pub usage_record_id: Option<UsageRecordId>,
    /// Whether a top-up credit was spent on this event.
    pub used_topup: bool,
    /// Whether this was a replay of an already-billed unit of work.
    pub deduplicated: bool,
    /// Base allowance left in the period, clamped at zero.
    pub base_remaining: i64,
    /// Top-up credits left.
    pub topup_remaining: i64,
    /// `base_remaining + topup_remaining`.
    pub total_remaining: i64,
}

impl Decision {
    pub fn no_account() -> Self {
        Self {
            allowed: false,
            reason: DecisionReason::NoAccount,
            usage_record_id: None,
            used_topup: false,
            deduplicated: false,
            base_remaining: 0,
            topup_remaining: 0,
            total_remaining: 0,
        }
    }

    pub fn limit_reached(remaining: Remaining) -> Self {
        Self {
            allowed: false,
            reason: DecisionReason::LimitReached,
            usage_record_id: None,
            used_topup: false,
            deduplicated: false,
            base_remaining: remaining.base,
            topup_remaining: remaining.topup,
            total_remaining: remaining.total(),
        }
    }

    pub fn already_counted(record_id: UsageRecordId, remaining: Remaining) -> Self {
        Self {
            allowed: true,
            reason: DecisionReason::AlreadyCounted,
            usage_record_id: Some(record_id),
            used_topup: false,
            deduplicated: true,
            base_remaining: remaining.base,
            topup_remaining: remaining.topup,
            total_remaining: remaining.total(),
        }
    }

    pub fn accepted(record_id: UsageRecordId, used_topup: bool, remaining: Remaining) -> Self {
        Self {
            allowed: true,
            reason: DecisionReason::Ok,
            usage_record_id: Some(record_id),
            used_topup,
            deduplicated: false,
            base_remaining: remaining.base,
            topup_remaining: remaining.topup,
            total_remaining: remaining.total(),
        }
    }
}

/// Remaining balances for an account at a point in time.
///
/// Always derived from observed state (a usage count and a balance read), never
/// by adjusting a previous value - that keeps the reported remainders
/// consistent when both the usage count and the top-up pool change in one
/// operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Remaining {
    pub base: i64,
    pub topup: i64,
}

impl Remaining {
    /// Compute remainders from a counted-usage total and a top-up balance.
    /// `base` is clamped at zero: usage can exceed the limit when the limit
    /// shrinks mid-period, and remainders are never reported negative.
    pub fn compute(base_limit: i64, counted_usage: i64, topup_credits: i64) -> Self {
        Self {
            base: (base_limit - counted_usage).max(0),
            topup: topup_credits.max(0),
        }
    }

    pub fn total(&self) -> i64 {
        self.base + self.topup
    }
}
