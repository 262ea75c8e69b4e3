use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use super::{
    dto::{LoginForm, SignupRequest, TokenResponse},
    password::{hash_password, verify_password},
    repo_types::{NewUser, User},
};
use crate::{
    error::{AppError, AppResult},
    mail::dispatch_confirmation,
    state::AppState,
};

pub const ALREADY_CONFIRMED: &str = "Your email is already confirmed";
pub const EMAIL_CONFIRMED: &str = "Email confirmed";
pub const CHECK_YOUR_EMAIL: &str = "Check your email for confirmation.";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    email.len() <= 50 && EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Resolves the bearer of an access token to a stored user.
#[instrument(skip_all)]
pub async fn resolve_current_user(state: &AppState, token: &str) -> AppResult<User> {
    let claims = state.jwt.decode_access(token).map_err(|e| {
        warn!(error = %e, "access token rejected");
        AppError::unauthorized()
    })?;
    state
        .users
        .find_by_email(&claims.sub)
        .await?
        .ok_or_else(|| {
            warn!("access token subject has no user");
            AppError::unauthorized()
        })
}

#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn signup(state: &AppState, mut payload: SignupRequest) -> AppResult<User> {
    payload.email = normalize_email(&payload.email);
    payload.username = payload.username.trim().to_owned();

    if !is_valid_email(&payload.email) {
        return Err(AppError::Validation("Invalid email".into()));
    }
    if payload.username.is_empty() || payload.username.chars().count() > 50 {
        return Err(AppError::Validation("Username must be 1 to 50 characters".into()));
    }
    if !(6..=72).contains(&payload.password.chars().count()) {
        return Err(AppError::Validation("Password must be 6 to 72 characters".into()));
    }

    if state.users.find_by_email(&payload.email).await?.is_some() {
        warn!("email already registered");
        return Err(AppError::Conflict("Account already exists".into()));
    }

    let password_hash = hash_password(&payload.password)?;
    let user = state
        .users
        .create(NewUser {
            username: payload.username,
            email: payload.email,
            password_hash,
        })
        .await
        .map_err(|e| match e {
            AppError::Conflict(_) => AppError::Conflict("Account already exists".into()),
            other => other,
        })?;

    dispatch_confirmation(state, &user.email, &user.username);
    info!(user_id = %user.id, "user registered");
    Ok(user)
}

#[instrument(skip(state, form), fields(email = %form.username))]
pub async fn login(state: &AppState, form: LoginForm) -> AppResult<TokenResponse> {
    let email = normalize_email(&form.username);
    let user = match state.users.find_by_email(&email).await? {
        Some(u) => u,
        None => {
            warn!("login unknown email");
            return Err(AppError::Unauthorized("Invalid email".into()));
        }
    };

    if !verify_password(&form.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::Unauthorized("Invalid password".into()));
    }

    let access_token = state.jwt.sign_access(&user.email)?;
    let refresh_token = state.jwt.sign_refresh(&user.email)?;
    state
        .users
        .set_refresh_token(user.id, Some(&refresh_token))
        .await?;

    info!(user_id = %user.id, "user logged in");
    Ok(TokenResponse::bearer(access_token, refresh_token))
}

/// Rotates the refresh token. A presented token that is not the stored one
/// revokes the stored token as well, forcing a new login.
#[instrument(skip_all)]
pub async fn refresh(state: &AppState, presented: &str) -> AppResult<TokenResponse> {
    let claims = state.jwt.decode_refresh(presented).map_err(|e| {
        warn!(error = %e, "refresh token rejected");
        AppError::Unauthorized("Could not validate credentials".into())
    })?;
    let user = state
        .users
        .find_by_email(&claims.sub)
        .await?
        .ok_or_else(AppError::unauthorized)?;

    if user.refresh_token.as_deref() != Some(presented) {
        warn!(user_id = %user.id, "stale refresh token presented; revoking");
        state.users.set_refresh_token(user.id, None).await?;
        return Err(AppError::Unauthorized("Invalid refresh token".into()));
    }

    let access_token = state.jwt.sign_access(&user.email)?;
    let refresh_token = state.jwt.sign_refresh(&user.email)?;
    let rotated = state
        .users
        .rotate_refresh_token(user.id, presented, &refresh_token)
        .await?;
    if !rotated {
        warn!(user_id = %user.id, "refresh token rotated concurrently; revoking");
        state.users.set_refresh_token(user.id, None).await?;
        return Err(AppError::Unauthorized("Invalid refresh token".into()));
    }

    info!(user_id = %user.id, "refresh token rotated");
    Ok(TokenResponse::bearer(access_token, refresh_token))
}

#[instrument(skip_all)]
pub async fn confirm_email(state: &AppState, token: &str) -> AppResult<&'static str> {
    let claims = state.jwt.decode_email_confirmation(token).map_err(|e| {
        warn!(error = %e, "confirmation token rejected");
        AppError::Validation("Invalid token for email verification".into())
    })?;
    let user = state
        .users
        .find_by_email(&claims.sub)
        .await?
        .ok_or_else(|| AppError::BadRequest("Verification error".into()))?;

    if user.confirmed {
        return Ok(ALREADY_CONFIRMED);
    }
    if state.users.confirm_email(&user.email).await? {
        info!(user_id = %user.id, "email confirmed");
    }
    Ok(EMAIL_CONFIRMED)
}

/// Same answer for unknown and unconfirmed addresses.
#[instrument(skip(state))]
pub async fn request_email(state: &AppState, email: &str) -> AppResult<&'static str> {
    let email = normalize_email(email);
    match state.users.find_by_email(&email).await? {
        Some(user) if user.confirmed => Ok(ALREADY_CONFIRMED),
        Some(user) => {
            dispatch_confirmation(state, &user.email, &user.username);
            Ok(CHECK_YOUR_EMAIL)
        }
        None => Ok(CHECK_YOUR_EMAIL),
    }
}
