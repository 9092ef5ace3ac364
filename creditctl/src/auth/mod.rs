//! Service-to-service authentication.
//!
//! This service sits behind the product's API tier, so authentication is a
//! single shared service key checked as `Authorization: Bearer <key>` on every
//! `/api/v1/*` route. End-user identity never reaches this layer - the caller
//! passes the resolved account id in request bodies instead.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::{AppState, errors::Error};

/// Reject requests that don't carry the configured service key.
///
/// When no key is configured the check is skipped entirely (development
/// mode); `Application::new` logs a warning in that case.
pub async fn service_key_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, Error> {
    let Some(expected) = state.config.service_api_key.as_deref() else {
        return Ok(next.run(request).await);
    };

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match provided {
        Some(key) if key == expected => Ok(next.run(request).await),
        Some(_) => Err(Error::Unauthenticated {
            message: Some("Invalid service key".to_string()),
        }),
        None => Err(Error::Unauthenticated {
            message: Some("Missing bearer token".to_string()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{auth_headers, create_test_app};

    #[test_log::test(tokio::test)]
    async fn requests_without_a_key_are_unauthorized() {
        let (server, _db) = create_test_app().await;

        let response = server.get("/api/v1/showcase/random").await;
        response.assert_status_unauthorized();
    }

    #[test_log::test(tokio::test)]
    async fn requests_with_a_wrong_key_are_unauthorized() {
        let (server, _db) = create_test_app().await;

        let response = server
            .get("/api/v1/showcase/random")
            .add_header("authorization", "Bearer wrong-key")
            .await;
        response.assert_status_unauthorized();
    }

    #[test_log::test(tokio::test)]
    async fn healthz_is_open() {
        let (server, _db) = create_test_app().await;

        let response = server.get("/healthz").await;
        response.assert_status_ok();
    }

    #[test_log::test(tokio::test)]
    async fn requests_with_the_key_pass_through() {
        let (server, _db) = create_test_app().await;

        let (name, value) = auth_headers();
        // Empty showcase table: authenticated but nothing to serve.
        let response = server
            .get("/api/v1/showcase/random")
            .add_header(name, value)
            .await;
        response.assert_status_not_found();
    }
}
