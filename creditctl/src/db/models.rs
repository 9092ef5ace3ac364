//! Database models shared by both storage backends.

use chrono::{DateTime, Utc};

use crate::types::{AccountId, SampleId};

/// A billing subject holding a top-up credit balance.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: AccountId,
    pub name: Option<String>,
    /// Current subscription tier label. The base allowance for this tier lives
    /// in configuration, not on the row, so tier limits can change without a
    /// data migration.
    pub tier: String,
    pub topup_credits: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for provisioning an account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: Option<String>,
    pub tier: String,
    pub topup_credits: i64,
}

/// An item served by the random showcase endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ShowcaseSample {
    pub id: SampleId,
    pub title: String,
    pub video_url: String,
    pub created_at: DateTime<Utc>,
}

/// Input for inserting a showcase sample.
#[derive(Debug, Clone)]
pub struct NewSample {
    pub title: String,
    pub video_url: String,
}
