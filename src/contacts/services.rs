use anyhow::Context;
use bytes::Bytes;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::repo_types::Contact;
use crate::{
    error::{AppError, AppResult},
    state::AppState,
};

pub struct UploadItem {
    pub body: Bytes,
    pub content_type: String,
}

/// One object per contact; a new upload overwrites the previous avatar.
pub fn avatar_key(contact_id: Uuid) -> String {
    format!("avatars/contacts/{}", contact_id)
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

fn not_found() -> AppError {
    AppError::NotFound("Contact not found or access denied".into())
}

#[instrument(skip(st, image), fields(size = image.body.len(), content_type = %image.content_type))]
pub async fn upload_avatar(
    st: &AppState,
    owner_id: Uuid,
    contact_id: Uuid,
    image: UploadItem,
) -> AppResult<Contact> {
    if image.body.is_empty() {
        return Err(AppError::Validation("file is empty".into()));
    }
    if ext_from_mime(&image.content_type).is_none() {
        return Err(AppError::Validation("Unsupported image type".into()));
    }

    st.contacts
        .get(owner_id, contact_id)
        .await?
        .ok_or_else(not_found)?;

    let key = avatar_key(contact_id);
    st.storage
        .put_object(&key, image.body, &image.content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;

    let url = format!(
        "{}?v={}",
        st.storage.public_url(&key),
        OffsetDateTime::now_utc().unix_timestamp()
    );
    let contact = st
        .contacts
        .set_avatar(owner_id, contact_id, &url)
        .await?
        .ok_or_else(not_found)?;

    info!(%contact_id, "avatar updated");
    Ok(contact)
}

/// Deletes the contact, then its avatar object. Storage errors are only logged.
#[instrument(skip(st))]
pub async fn delete_contact(st: &AppState, owner_id: Uuid, contact_id: Uuid) -> AppResult<Contact> {
    let contact = st
        .contacts
        .delete(owner_id, contact_id)
        .await?
        .ok_or_else(not_found)?;

    if contact.avatar.is_some() {
        if let Err(e) = st.storage.delete_object(&avatar_key(contact_id)).await {
            warn!(error = %e, %contact_id, "avatar cleanup failed");
        }
    }
    info!(%contact_id, "contact deleted");
    Ok(contact)
}
