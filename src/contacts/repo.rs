use async_trait::async_trait;
use sqlx::PgPool;
use time::{Date, Duration};
use uuid::Uuid;

use super::repo_types::{Contact, ContactFields};
use crate::error::AppResult;

const CONTACT_COLUMNS: &str = "id, owner_id, first_name, last_name, email, phone_number, \
     date_of_birth, description, avatar, created_at, updated_at";

/// Contacts, always scoped to their owner.
#[async_trait]
pub trait ContactRepo: Send + Sync {
    async fn list(&self, owner_id: Uuid, limit: i64, offset: i64) -> AppResult<Vec<Contact>>;
    async fn get(&self, owner_id: Uuid, id: Uuid) -> AppResult<Option<Contact>>;
    async fn find_by_first_name(&self, owner_id: Uuid, first_name: &str) -> AppResult<Vec<Contact>>;
    async fn find_by_last_name(&self, owner_id: Uuid, last_name: &str) -> AppResult<Vec<Contact>>;
    /// Contacts whose birthday (month and day) falls within `today..=today + days`.
    async fn upcoming_birthdays(&self, owner_id: Uuid, today: Date, days: i64) -> AppResult<Vec<Contact>>;
    async fn create(&self, owner_id: Uuid, fields: ContactFields) -> AppResult<Contact>;
    async fn update(&self, owner_id: Uuid, id: Uuid, fields: ContactFields) -> AppResult<Option<Contact>>;
    async fn delete(&self, owner_id: Uuid, id: Uuid) -> AppResult<Option<Contact>>;
    async fn set_avatar(&self, owner_id: Uuid, id: Uuid, url: &str) -> AppResult<Option<Contact>>;
}

pub type MonthDay = (u8, u8);

pub fn month_day(d: Date) -> MonthDay {
    (d.month() as u8, d.day())
}

/// First and last month-day of the window; the window may wrap past Dec 31.
pub fn birthday_window(today: Date, days: i64) -> (MonthDay, MonthDay) {
    (month_day(today), month_day(today + Duration::days(days)))
}

pub fn in_birthday_window(dob: Date, (from, to): (MonthDay, MonthDay)) -> bool {
    let md = month_day(dob);
    if from <= to {
        from <= md && md <= to
    } else {
        md >= from || md <= to
    }
}

/// Orders contacts by how soon their birthday comes within the window.
pub fn sort_by_upcoming(contacts: &mut [Contact], (from, _): (MonthDay, MonthDay)) {
    contacts.sort_by_key(|c| {
        let md = month_day(c.date_of_birth);
        (md < from, md)
    });
}

fn md_text((m, d): MonthDay) -> String {
    format!("{m:02}-{d:02}")
}

#[derive(Clone)]
pub struct PgContactRepo {
    db: PgPool,
}

impl PgContactRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn find_by_column(&self, owner_id: Uuid, column: &str, value: &str) -> AppResult<Vec<Contact>> {
        let rows = sqlx::query_as::<_, Contact>(&format!(
            r#"
            SELECT {CONTACT_COLUMNS}
              FROM contacts
             WHERE owner_id = $1 AND {column} = $2
             ORDER BY created_at ASC
            "#
        ))
        .bind(owner_id)
        .bind(value)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl ContactRepo for PgContactRepo {
    async fn list(&self, owner_id: Uuid, limit: i64, offset: i64) -> AppResult<Vec<Contact>> {
        let rows = sqlx::query_as::<_, Contact>(&format!(
            r#"
            SELECT {CONTACT_COLUMNS}
              FROM contacts
             WHERE owner_id = $1
             ORDER BY created_at ASC
             LIMIT $2 OFFSET $3
            "#
        ))
        .bind(owner_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn get(&self, owner_id: Uuid, id: Uuid) -> AppResult<Option<Contact>> {
        let row = sqlx::query_as::<_, Contact>(&format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = $1 AND owner_id = $2"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn find_by_first_name(&self, owner_id: Uuid, first_name: &str) -> AppResult<Vec<Contact>> {
        self.find_by_column(owner_id, "first_name", first_name).await
    }

    async fn find_by_last_name(&self, owner_id: Uuid, last_name: &str) -> AppResult<Vec<Contact>> {
        self.find_by_column(owner_id, "last_name", last_name).await
    }

    async fn upcoming_birthdays(&self, owner_id: Uuid, today: Date, days: i64) -> AppResult<Vec<Contact>> {
        let window = birthday_window(today, days);
        let mut rows = sqlx::query_as::<_, Contact>(&format!(
            r#"
            SELECT {CONTACT_COLUMNS}
              FROM contacts
             WHERE owner_id = $1
               AND CASE WHEN $2 <= $3
                        THEN to_char(date_of_birth, 'MM-DD') BETWEEN $2 AND $3
                        ELSE to_char(date_of_birth, 'MM-DD') >= $2
                          OR to_char(date_of_birth, 'MM-DD') <= $3
                   END
            "#
        ))
        .bind(owner_id)
        .bind(md_text(window.0))
        .bind(md_text(window.1))
        .fetch_all(&self.db)
        .await?;
        sort_by_upcoming(&mut rows, window);
        Ok(rows)
    }

    async fn create(&self, owner_id: Uuid, f: ContactFields) -> AppResult<Contact> {
        let row = sqlx::query_as::<_, Contact>(&format!(
            r#"
            INSERT INTO contacts
                (owner_id, first_name, last_name, email, phone_number, date_of_birth, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {CONTACT_COLUMNS}
            "#
        ))
        .bind(owner_id)
        .bind(&f.first_name)
        .bind(&f.last_name)
        .bind(&f.email)
        .bind(&f.phone_number)
        .bind(f.date_of_birth)
        .bind(&f.description)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn update(&self, owner_id: Uuid, id: Uuid, f: ContactFields) -> AppResult<Option<Contact>> {
        let row = sqlx::query_as::<_, Contact>(&format!(
            r#"
            UPDATE contacts
               SET first_name = $3, last_name = $4, email = $5, phone_number = $6,
                   date_of_birth = $7, description = $8, updated_at = now()
             WHERE id = $1 AND owner_id = $2
            RETURNING {CONTACT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(owner_id)
        .bind(&f.first_name)
        .bind(&f.last_name)
        .bind(&f.email)
        .bind(&f.phone_number)
        .bind(f.date_of_birth)
        .bind(&f.description)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn delete(&self, owner_id: Uuid, id: Uuid) -> AppResult<Option<Contact>> {
        let row = sqlx::query_as::<_, Contact>(&format!(
            "DELETE FROM contacts WHERE id = $1 AND owner_id = $2 RETURNING {CONTACT_COLUMNS}"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn set_avatar(&self, owner_id: Uuid, id: Uuid, url: &str) -> AppResult<Option<Contact>> {
        let row = sqlx::query_as::<_, Contact>(&format!(
            r#"
            UPDATE contacts
               SET avatar = $3, updated_at = now()
             WHERE id = $1 AND owner_id = $2
            RETURNING {CONTACT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(owner_id)
        .bind(url)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }
}
