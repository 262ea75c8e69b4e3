use axum::{
    extract::{
        rejection::{FormRejection, JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    routing::{get, post},
    Form, Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{LoginForm, MessageResponse, RequestEmail, SignupRequest, TokenResponse, UserResponse},
        extractors::{BearerToken, CurrentUser},
        services,
    },
    error::AppResult,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/refresh_token", get(refresh_token))
        .route("/auth/me", get(get_me))
        .route("/auth/confirmed_email/:token", get(confirmed_email))
        .route("/auth/request_email", post(request_email))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    let Json(payload) = payload?;
    let user = services::signup(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, form))]
pub async fn login(
    State(state): State<AppState>,
    form: Result<Form<LoginForm>, FormRejection>,
) -> AppResult<Json<TokenResponse>> {
    let Form(form) = form?;
    services::login(&state, form).await.map(Json)
}

#[instrument(skip(state, token))]
pub async fn refresh_token(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> AppResult<Json<TokenResponse>> {
    services::refresh(&state, &token).await.map(Json)
}

#[instrument(skip_all)]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(user.into())
}

#[instrument(skip(state, token))]
pub async fn confirmed_email(
    State(state): State<AppState>,
    token: Result<Path<String>, PathRejection>,
) -> AppResult<Json<MessageResponse>> {
    let Path(token) = token?;
    let message = services::confirm_email(&state, &token).await?;
    Ok(Json(MessageResponse::new(message)))
}

#[instrument(skip(state, body))]
pub async fn request_email(
    State(state): State<AppState>,
    body: Result<Json<RequestEmail>, JsonRejection>,
) -> AppResult<Json<MessageResponse>> {
    let Json(body) = body?;
    let message = services::request_email(&state, &body.email).await?;
    Ok(Json(MessageResponse::new(message)))
}
