use axum::{extract::State, response::Json};

use crate::{
    AppState,
    api::models::generations::GenerationCreate,
    errors::{Error, Result},
    ledger::{ConsumeRequest, Decision},
};

/// Record one unit of paid usage through the credit ledger gate.
///
/// Policy denials (`limit_reached`, `no_account`) are ordinary 200 responses
/// with `allowed: false` - the caller turns them into product-level denials.
/// Replays of an already-billed unit of work come back as `allowed: true`
/// with `deduplicated: true` and must be treated as transparent successes.
#[utoipa::path(
    post,
    path = "/generations",
    tag = "generations",
    summary = "Record a video generation",
    request_body = GenerationCreate,
    responses(
        (status = 200, description = "Gate decision (allowed or denied)", body = Decision),
        (status = 400, description = "Invalid period bounds or base limit"),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Storage fault; the operation had no effect and may be retried"),
    ),
    security(("service_key" = []))
)]
pub async fn record_generation(
    State(state): State<AppState>,
    Json(data): Json<GenerationCreate>,
) -> Result<Json<Decision>> {
    if data.period_start > data.period_end {
        return Err(Error::BadRequest {
            message: "period_start must not be after period_end".to_string(),
        });
    }

    let base_limit = match data.base_limit {
        Some(limit) if limit < 0 => {
            return Err(Error::BadRequest {
                message: "base_limit must be non-negative".to_string(),
            });
        }
        Some(limit) => limit,
        None => state.config.tiers.base_limit_for(&data.tier),
    };

    let request = ConsumeRequest {
        account_id: data.account_id,
        dedup_key: data.dedup_key,
        request_id: data.request_id,
        tier: data.tier,
        base_limit,
        period_start: data.period_start,
        period_end: data.period_end,
        video_id: data.video_id,
        counted: data.counted.unwrap_or(true),
    };

    let decision = state.db.ledger().consume(&request).await?;

    tracing::debug!(
        account = %crate::types::abbrev_uuid(&request.account_id),
        reason = ?decision.reason,
        deduplicated = decision.deduplicated,
        used_topup = decision.used_topup,
        "gate decision"
    );

    Ok(Json(decision))
}
