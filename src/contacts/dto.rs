use serde::{Deserialize, Serialize};
use time::Date;
use uuid::Uuid;

use super::repo_types::{Contact, ContactFields};
use crate::{auth::services::is_valid_email, error::AppError};

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// Request body for create and update. Avatars go through the upload route.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContactBody {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    #[serde(with = "iso_date")]
    pub date_of_birth: Date,
    #[serde(default)]
    pub description: Option<String>,
}

fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<(), AppError> {
    let n = value.chars().count();
    if n < min || n > max {
        return Err(AppError::Validation(format!(
            "{field} must be {min} to {max} characters"
        )));
    }
    Ok(())
}

impl TryFrom<ContactBody> for ContactFields {
    type Error = AppError;

    fn try_from(body: ContactBody) -> Result<Self, Self::Error> {
        let first_name = body.first_name.trim().to_owned();
        let last_name = body.last_name.trim().to_owned();
        let email = body.email.trim().to_lowercase();
        let phone_number = body.phone_number.trim().to_owned();

        check_len("first_name", &first_name, 3, 25)?;
        check_len("last_name", &last_name, 3, 25)?;
        check_len("phone_number", &phone_number, 5, 20)?;
        if !is_valid_email(&email) {
            return Err(AppError::Validation("Invalid email".into()));
        }

        Ok(ContactFields {
            first_name,
            last_name,
            email,
            phone_number,
            date_of_birth: body.date_of_birth,
            description: body.description.filter(|d| !d.trim().is_empty()),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContactResponse {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    #[serde(with = "iso_date")]
    pub date_of_birth: Date,
    pub description: Option<String>,
    pub avatar: Option<String>,
}

impl From<Contact> for ContactResponse {
    fn from(c: Contact) -> Self {
        Self {
            id: c.id,
            first_name: c.first_name,
            last_name: c.last_name,
            email: c.email,
            phone_number: c.phone_number,
            date_of_birth: c.date_of_birth,
            description: c.description,
            avatar: c.avatar,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    10
}

impl Pagination {
    pub fn validate(&self) -> Result<(), AppError> {
        if !(10..=500).contains(&self.limit) {
            return Err(AppError::Validation("limit must be between 10 and 500".into()));
        }
        if self.offset < 0 {
            return Err(AppError::Validation("offset must be non-negative".into()));
        }
        Ok(())
    }
}
