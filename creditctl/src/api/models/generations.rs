use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::types::AccountId;

// Request models

/// One unit of paid usage to record: a generated video attributed to an
/// account within a billing period.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GenerationCreate {
    /// Account being charged
    #[schema(value_type = String, format = "uuid")]
    pub account_id: AccountId,
    /// External content id (e.g. the platform video id); resubmissions with
    /// the same key in the same period are deduplicated, not double-charged
    pub dedup_key: String,
    /// Caller correlation id (request or session id), stored for audit
    pub request_id: String,
    /// Subscription tier label, snapshotted onto the ledger row
    pub tier: String,
    /// Overrides the tier's configured allowance when present
    pub base_limit: Option<i64>,
    /// Inclusive start of the billing period
    pub period_start: DateTime<Utc>,
    /// Inclusive end of the billing period
    pub period_end: DateTime<Utc>,
    /// Optional linked resource (the generated video)
    #[schema(value_type = Option<String>, format = "uuid")]
    pub video_id: Option<Uuid>,
    /// Whether this event counts toward the allowance (default true).
    /// Uncounted events are recorded but never checked or charged.
    pub counted: Option<bool>,
}
