use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};

use crate::{
    AppState,
    api::models::accounts::{AccountCreate, AccountResponse, TopupGrant, UsageQuery, UsageSummaryResponse},
    db::models::NewAccount,
    errors::{Error, Result},
    ledger::Remaining,
    types::AccountId,
};

/// Provision a billing account.
#[utoipa::path(
    post,
    path = "/accounts",
    tag = "accounts",
    summary = "Create an account",
    request_body = AccountCreate,
    responses(
        (status = 201, description = "Account created", body = AccountResponse),
        (status = 400, description = "Invalid initial balance"),
        (status = 401, description = "Unauthorized"),
    ),
    security(("service_key" = []))
)]
pub async fn create_account(
    State(state): State<AppState>,
    Json(data): Json<AccountCreate>,
) -> Result<(StatusCode, Json<AccountResponse>)> {
    let topup_credits = data.topup_credits.unwrap_or(0);
    if topup_credits < 0 {
        return Err(Error::BadRequest {
            message: "topup_credits must be non-negative".to_string(),
        });
    }

    let account = state
        .db
        .accounts()
        .create(&NewAccount {
            name: data.name,
            tier: data.tier.unwrap_or_else(|| "free".to_string()),
            topup_credits,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(AccountResponse::from(account))))
}

/// Fetch an account.
#[utoipa::path(
    get,
    path = "/accounts/{id}",
    tag = "accounts",
    summary = "Get an account",
    params(("id" = String, Path, description = "Account ID (UUID)")),
    responses(
        (status = 200, description = "The account", body = AccountResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Account not found"),
    ),
    security(("service_key" = []))
)]
pub async fn get_account(
    State(state): State<AppState>,
    Path(id): Path<AccountId>,
) -> Result<Json<AccountResponse>> {
    let account = state.db.accounts().get(id).await?;
    Ok(Json(AccountResponse::from(account)))
}

/// Add purchased top-up credits to an account.
///
/// This is the landing point of the external purchase flow; the gate is the
/// only code path that ever decrements the pool.
#[utoipa::path(
    post,
    path = "/accounts/{id}/topup",
    tag = "accounts",
    summary = "Grant top-up credits",
    params(("id" = String, Path, description = "Account ID (UUID)")),
    request_body = TopupGrant,
    responses(
        (status = 200, description = "Updated account", body = AccountResponse),
        (status = 400, description = "Non-positive credit amount"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Account not found"),
    ),
    security(("service_key" = []))
)]
pub async fn grant_topup(
    State(state): State<AppState>,
    Path(id): Path<AccountId>,
    Json(data): Json<TopupGrant>,
) -> Result<Json<AccountResponse>> {
    if data.credits <= 0 {
        return Err(Error::BadRequest {
            message: "credits must be greater than zero".to_string(),
        });
    }

    let account = state.db.accounts().grant_topup(id, data.credits).await?;
    Ok(Json(AccountResponse::from(account)))
}

/// Counted usage and remaining balances for an account within a period.
#[utoipa::path(
    get,
    path = "/accounts/{id}/usage",
    tag = "accounts",
    summary = "Get usage for a billing period",
    params(
        ("id" = String, Path, description = "Account ID (UUID)"),
        UsageQuery
    ),
    responses(
        (status = 200, description = "Usage summary", body = UsageSummaryResponse),
        (status = 400, description = "Invalid period bounds"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Account not found"),
    ),
    security(("service_key" = []))
)]
pub async fn get_usage(
    State(state): State<AppState>,
    Path(id): Path<AccountId>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<UsageSummaryResponse>> {
    if query.period_start > query.period_end {
        return Err(Error::BadRequest {
            message: "period_start must not be after period_end".to_string(),
        });
    }

    let account = state.db.accounts().get(id).await?;
    let counted_usage = state
        .db
        .ledger()
        .counted_usage(id, query.period_start, query.period_end)
        .await?;

    let base_limit = state.config.tiers.base_limit_for(&account.tier);
    let remaining = Remaining::compute(base_limit, counted_usage, account.topup_credits);

    Ok(Json(UsageSummaryResponse {
        account_id: id,
        period_start: query.period_start,
        period_end: query.period_end,
        counted_usage,
        base_limit,
        base_remaining: remaining.base,
        topup_remaining: remaining.topup,
        total_remaining: remaining.total(),
    }))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::test_utils::{auth_headers, consume_one, create_account, create_test_app};

    #[test_log::test(tokio::test)]
    async fn create_and_fetch_account() {
        let (server, _db) = create_test_app().await;

        let (name, value) = auth_headers();
        let created = server
            .post("/api/v1/accounts")
            .add_header(name.clone(), value.clone())
            .json(&json!({ "name": "pilot customer", "tier": "creator" }))
            .await;
        created.assert_status(StatusCode::CREATED);
        let created: AccountResponse = created.json();
        assert_eq!(created.tier, "creator");
        assert_eq!(created.topup_credits, 0);

        let fetched = server
            .get(&format!("/api/v1/accounts/{}", created.id))
            .add_header(name, value)
            .await;
        fetched.assert_status_ok();
        let fetched: AccountResponse = fetched.json();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.name.as_deref(), Some("pilot customer"));
    }

    #[test_log::test(tokio::test)]
    async fn negative_initial_balance_is_rejected() {
        let (server, _db) = create_test_app().await;

        let (name, value) = auth_headers();
        let response = server
            .post("/api/v1/accounts")
            .add_header(name, value)
            .json(&json!({ "topup_credits": -5 }))
            .await;
        response.assert_status_bad_request();
    }

    #[test_log::test(tokio::test)]
    async fn missing_account_is_404() {
        let (server, _db) = create_test_app().await;

        let (name, value) = auth_headers();
        let response = server
            .get(&format!("/api/v1/accounts/{}", Uuid::new_v4()))
            .add_header(name, value)
            .await;
        response.assert_status_not_found();
    }

    #[test_log::test(tokio::test)]
    async fn topup_grant_accumulates_and_rejects_non_positive() {
        let (server, db) = create_test_app().await;
        let account = create_account(&db, "free", 0).await;

        let (name, value) = auth_headers();
        let response = server
            .post(&format!("/api/v1/accounts/{}/topup", account.id))
            .add_header(name.clone(), value.clone())
            .json(&json!({ "credits": 7 }))
            .await;
        response.assert_status_ok();
        let updated: AccountResponse = response.json();
        assert_eq!(updated.topup_credits, 7);

        let response = server
            .post(&format!("/api/v1/accounts/{}/topup", account.id))
            .add_header(name.clone(), value.clone())
            .json(&json!({ "credits": 0 }))
            .await;
        response.assert_status_bad_request();

        let response = server
            .post(&format!("/api/v1/accounts/{}/topup", account.id))
            .add_header(name, value)
            .json(&json!({ "credits": -3 }))
            .await;
        response.assert_status_bad_request();
    }

    #[test_log::test(tokio::test)]
    async fn usage_summary_reflects_consumption() {
        let (server, db) = create_test_app().await;
        // "free" allows 3 in the default test config.
        let account = create_account(&db, "free", 2).await;

        let now = Utc::now();
        let period_start = now - Duration::hours(1);
        let period_end = now + Duration::hours(1);

        consume_one(&db, account.id, "vid-1", 3, period_start, period_end).await;
        consume_one(&db, account.id, "vid-2", 3, period_start, period_end).await;

        let (name, value) = auth_headers();
        let response = server
            .get(&format!(
                "/api/v1/accounts/{}/usage?period_start={}&period_end={}",
                account.id,
                period_start.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                period_end.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            ))
            .add_header(name, value)
            .await;
        response.assert_status_ok();
        let summary: UsageSummaryResponse = response.json();
        assert_eq!(summary.counted_usage, 2);
        assert_eq!(summary.base_limit, 3);
        assert_eq!(summary.base_remaining, 1);
        assert_eq!(summary.topup_remaining, 2);
        assert_eq!(summary.total_remaining, 3);
    }

    #[test_log::test(tokio::test)]
    async fn usage_with_inverted_period_is_rejected() {
        let (server, db) = create_test_app().await;
        let account = create_account(&db, "free", 0).await;

        let now = Utc::now();
        let (name, value) = auth_headers();
        let response = server
            .get(&format!(
                "/api/v1/accounts/{}/usage?period_start={}&period_end={}",
                account.id,
                (now + Duration::hours(1)).to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                (now - Duration::hours(1)).to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            ))
            .add_header(name, value)
            .await;
        response.assert_status_bad_request();
    }
}
