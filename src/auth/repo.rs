use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, User};
use crate::error::AppResult;

const USER_COLUMNS: &str =
    "id, username, email, password_hash, refresh_token, confirmed, created_at, updated_at";

/// Credential store.
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;

    /// Fails with `Conflict` when the username or email is taken.
    async fn create(&self, user: NewUser) -> AppResult<User>;

    /// Unconditionally replaces the stored refresh token.
    async fn set_refresh_token(&self, user_id: Uuid, token: Option<&str>) -> AppResult<()>;

    /// Replaces the stored refresh token only while it still equals `current`.
    /// Returns whether the swap happened.
    async fn rotate_refresh_token(&self, user_id: Uuid, current: &str, next: &str) -> AppResult<bool>;

    /// Marks the user confirmed. Returns false when nothing changed.
    async fn confirm_email(&self, email: &str) -> AppResult<bool>;

    async fn ping(&self) -> AppResult<()>;
}

#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create(&self, user: NewUser) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&self.db)
        .await?;
        Ok(user)
    }

    async fn set_refresh_token(&self, user_id: Uuid, token: Option<&str>) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE users
               SET refresh_token = $2, updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(token)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn rotate_refresh_token(&self, user_id: Uuid, current: &str, next: &str) -> AppResult<bool> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET refresh_token = $3, updated_at = now()
             WHERE id = $1 AND refresh_token = $2
            "#,
        )
        .bind(user_id)
        .bind(current)
        .bind(next)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn confirm_email(&self, email: &str) -> AppResult<bool> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET confirmed = TRUE, updated_at = now()
             WHERE email = $1 AND confirmed = FALSE
            "#,
        )
        .bind(email)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.db)
            .await?;
        Ok(())
    }
}
