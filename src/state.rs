use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::auth::{
    jwt::JwtKeys,
    repo::{PgUserRepo, UserRepo},
};
use crate::config::AppConfig;
use crate::contacts::repo::{ContactRepo, PgContactRepo};
use crate::mail::{self, Mailer};
use crate::storage::{Storage, StorageClient};

/// Everything a request needs, built once in `main` and cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub jwt: JwtKeys,
    pub users: Arc<dyn UserRepo>,
    pub contacts: Arc<dyn ContactRepo>,
    pub storage: Arc<dyn StorageClient>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    /// Connects the pool and the external clients. The pool is returned too
    /// so `main` can run migrations on it.
    pub async fn init(config: AppConfig) -> anyhow::Result<(Self, PgPool)> {
        let config = Arc::new(config);
        let jwt = JwtKeys::from_config(&config.jwt)?;

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let storage = Arc::new(Storage::new(&config.storage).await?) as Arc<dyn StorageClient>;
        let mailer = mail::from_config(&config.mail)?;

        let state = Self {
            jwt,
            users: Arc::new(PgUserRepo::new(db.clone())),
            contacts: Arc::new(PgContactRepo::new(db.clone())),
            storage,
            mailer,
            config,
        };
        Ok((state, db))
    }
}
