use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection, QueryRejection},
        DefaultBodyLimit, Multipart, Path, Query, State,
    },
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{ContactBody, ContactResponse, Pagination},
    repo_types::{Contact, ContactFields},
    services::{self, UploadItem},
};
use crate::{
    auth::extractors::CurrentUser,
    error::{AppError, AppResult},
    state::AppState,
};

const BIRTHDAY_WINDOW_DAYS: i64 = 7;

pub fn contact_routes() -> Router<AppState> {
    Router::new()
        .route("/app_hw", get(list_contacts).post(create_contact))
        .route("/app_hw/", get(list_contacts).post(create_contact))
        .route("/app_hw/birthdays", get(upcoming_birthdays))
        .route("/app_hw/first_name/:first_name", get(by_first_name))
        .route("/app_hw/last_name/:last_name", get(by_last_name))
        .route(
            "/app_hw/:id",
            get(get_contact).put(update_contact).delete(delete_contact),
        )
        .route(
            "/app_hw/:id/avatar",
            patch(upload_avatar).layer(DefaultBodyLimit::max(10 * 1024 * 1024)),
        )
}

fn to_responses(contacts: Vec<Contact>) -> Json<Vec<ContactResponse>> {
    Json(contacts.into_iter().map(Into::into).collect())
}

fn not_found() -> AppError {
    AppError::NotFound("Contact not found or access denied".into())
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn list_contacts(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    p: Result<Query<Pagination>, QueryRejection>,
) -> AppResult<Json<Vec<ContactResponse>>> {
    let Query(p) = p?;
    p.validate()?;
    let contacts = state.contacts.list(user.id, p.limit, p.offset).await?;
    Ok(to_responses(contacts))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn upcoming_birthdays(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<ContactResponse>>> {
    let today = OffsetDateTime::now_utc().date();
    let contacts = state
        .contacts
        .upcoming_birthdays(user.id, today, BIRTHDAY_WINDOW_DAYS)
        .await?;
    if contacts.is_empty() {
        return Err(AppError::NotFound("No upcoming birthdays found".into()));
    }
    Ok(to_responses(contacts))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn get_contact(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<ContactResponse>> {
    let Path(id) = id?;
    let contact = state.contacts.get(user.id, id).await?.ok_or_else(not_found)?;
    Ok(Json(contact.into()))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn by_first_name(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(first_name): Path<String>,
) -> AppResult<Json<Vec<ContactResponse>>> {
    let contacts = state.contacts.find_by_first_name(user.id, &first_name).await?;
    if contacts.is_empty() {
        return Err(AppError::NotFound("No contacts found with this first name".into()));
    }
    Ok(to_responses(contacts))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn by_last_name(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(last_name): Path<String>,
) -> AppResult<Json<Vec<ContactResponse>>> {
    let contacts = state.contacts.find_by_last_name(user.id, &last_name).await?;
    if contacts.is_empty() {
        return Err(AppError::NotFound("No contacts found with this last name".into()));
    }
    Ok(to_responses(contacts))
}

#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn create_contact(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    body: Result<Json<ContactBody>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ContactResponse>)> {
    let Json(body) = body?;
    let fields = ContactFields::try_from(body)?;
    let contact = state.contacts.create(user.id, fields).await?;
    Ok((StatusCode::CREATED, Json(contact.into())))
}

#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn update_contact(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<ContactBody>, JsonRejection>,
) -> AppResult<Json<ContactResponse>> {
    let Path(id) = id?;
    let Json(body) = body?;
    let fields = ContactFields::try_from(body)?;
    let contact = state
        .contacts
        .update(user.id, id, fields)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(contact.into()))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn delete_contact(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<ContactResponse>> {
    let Path(id) = id?;
    let contact = services::delete_contact(&state, user.id, id).await?;
    Ok(Json(contact.into()))
}

/// PATCH /app_hw/:id/avatar (multipart, field `file`)
#[instrument(skip(state, user, mp), fields(user_id = %user.id))]
pub async fn upload_avatar(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    id: Result<Path<Uuid>, PathRejection>,
    mp: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<ContactResponse>> {
    let Path(id) = id?;
    let mut mp = mp?;
    let mut upload = None;
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        if field.name() == Some("file") {
            let content_type = field
                .content_type()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "application/octet-stream".into());
            let body = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            upload = Some(UploadItem { body, content_type });
            break;
        }
    }
    let upload = upload.ok_or_else(|| AppError::Validation("file is required".into()))?;

    let contact = services::upload_avatar(&state, user.id, id, upload).await?;
    Ok(Json(contact.into()))
}
