use async_trait::async_trait;

use crate::db::{
    error::DbResult,
    models::{NewSample, ShowcaseSample},
};

/// Showcase samples: inserted by admins, served one-at-random to clients.
#[async_trait]
pub trait SampleRepo: Send + Sync {
    async fn create(&self, input: &NewSample) -> DbResult<ShowcaseSample>;

    /// Pick a uniformly random sample, or `None` when the table is empty.
    async fn random(&self) -> DbResult<Option<ShowcaseSample>>;
}
