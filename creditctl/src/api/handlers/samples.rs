use axum::{extract::State, http::StatusCode, response::Json};

use crate::{
    AppState,
    api::models::samples::{SampleCreate, SampleResponse},
    db::models::NewSample,
    errors::{Error, Result},
};

/// Serve a random showcase sample.
#[utoipa::path(
    get,
    path = "/showcase/random",
    tag = "showcase",
    summary = "Pick a random showcase sample",
    responses(
        (status = 200, description = "A randomly chosen sample", body = SampleResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No samples available"),
    ),
    security(("service_key" = []))
)]
pub async fn random_sample(State(state): State<AppState>) -> Result<Json<SampleResponse>> {
    let sample = state.db.samples().random().await?.ok_or(Error::NotFound {
        resource: "showcase sample".to_string(),
        id: "random".to_string(),
    })?;

    Ok(Json(SampleResponse::from(sample)))
}

/// Add a showcase sample.
#[utoipa::path(
    post,
    path = "/showcase",
    tag = "showcase",
    summary = "Add a showcase sample",
    request_body = SampleCreate,
    responses(
        (status = 201, description = "Sample created", body = SampleResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("service_key" = []))
)]
pub async fn create_sample(
    State(state): State<AppState>,
    Json(data): Json<SampleCreate>,
) -> Result<(StatusCode, Json<SampleResponse>)> {
    let sample = state
        .db
        .samples()
        .create(&NewSample {
            title: data.title,
            video_url: data.video_url,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(SampleResponse::from(sample))))
}
