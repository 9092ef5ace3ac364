use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{db::models::ShowcaseSample, types::SampleId};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SampleCreate {
    pub title: String,
    pub video_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SampleResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: SampleId,
    pub title: String,
    pub video_url: String,
    pub created_at: DateTime<Utc>,
}

impl From<ShowcaseSample> for SampleResponse {
    fn from(sample: ShowcaseSample) -> Self {
        Self {
            id: sample.id,
            title: sample.title,
            video_url: sample.video_url,
            created_at: sample.created_at,
        }
    }
}
