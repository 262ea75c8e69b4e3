use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};

use super::{repo_types::User, services::resolve_current_user};
use crate::{error::AppError, state::AppState};

/// Raw token from `Authorization: Bearer <token>`.
pub struct BearerToken(pub String);

/// The user behind a valid access token.
pub struct CurrentUser(pub User);

fn bearer_from_headers(headers: &HeaderMap) -> Result<String, AppError> {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".into()))?;

    let (scheme, token) = auth
        .split_once(' ')
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization header".into()))?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return Err(AppError::Unauthorized("Invalid authorization header".into()));
    }
    Ok(token.trim().to_owned())
}

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        bearer_from_headers(&parts.headers).map(BearerToken)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_from_headers(&parts.headers)?;
        let user = resolve_current_user(state, &token).await?;
        Ok(CurrentUser(user))
    }
}
