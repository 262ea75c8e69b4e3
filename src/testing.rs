//! In-memory stand-ins for the database, object store and mail relay,
//! plus helpers for driving the router in tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration as StdDuration,
};

use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use time::{Date, OffsetDateTime};
use tower::ServiceExt;
use uuid::Uuid;

use crate::{
    auth::{
        jwt::test_keys,
        password::hash_password,
        repo::UserRepo,
        repo_types::{NewUser, User},
    },
    config::{AppConfig, JwtConfig, MailConfig, StorageConfig},
    contacts::{
        repo::{birthday_window, in_birthday_window, sort_by_upcoming, ContactRepo},
        repo_types::{Contact, ContactFields},
    },
    error::{AppError, AppResult},
    mail::{ConfirmationMail, Mailer},
    state::AppState,
    storage::StorageClient,
};

#[derive(Default)]
pub struct InMemoryUserRepo {
    users: Mutex<Vec<User>>,
    confirm_writes: AtomicUsize,
    down: AtomicBool,
}

impl InMemoryUserRepo {
    pub fn get(&self, email: &str) -> Option<User> {
        self.users.lock().unwrap().iter().find(|u| u.email == email).cloned()
    }

    pub fn confirm_writes(&self) -> usize {
        self.confirm_writes.load(Ordering::SeqCst)
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check_up(&self) -> AppResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepo for InMemoryUserRepo {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        self.check_up()?;
        Ok(self.get(email))
    }

    async fn create(&self, user: NewUser) -> AppResult<User> {
        self.check_up()?;
        let mut users = self.users.lock().unwrap();
        if users
            .iter()
            .any(|u| u.email == user.email || u.username == user.username)
        {
            return Err(AppError::Conflict("Resource already exists".into()));
        }
        let now = OffsetDateTime::now_utc();
        let row = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            refresh_token: None,
            confirmed: false,
            created_at: now,
            updated_at: now,
        };
        users.push(row.clone());
        Ok(row)
    }

    async fn set_refresh_token(&self, user_id: Uuid, token: Option<&str>) -> AppResult<()> {
        self.check_up()?;
        if let Some(u) = self.users.lock().unwrap().iter_mut().find(|u| u.id == user_id) {
            u.refresh_token = token.map(str::to_owned);
        }
        Ok(())
    }

    async fn rotate_refresh_token(&self, user_id: Uuid, current: &str, next: &str) -> AppResult<bool> {
        self.check_up()?;
        let mut users = self.users.lock().unwrap();
        match users
            .iter_mut()
            .find(|u| u.id == user_id && u.refresh_token.as_deref() == Some(current))
        {
            Some(u) => {
                u.refresh_token = Some(next.to_owned());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn confirm_email(&self, email: &str) -> AppResult<bool> {
        self.check_up()?;
        let mut users = self.users.lock().unwrap();
        match users.iter_mut().find(|u| u.email == email && !u.confirmed) {
            Some(u) => {
                u.confirmed = true;
                self.confirm_writes.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ping(&self) -> AppResult<()> {
        self.check_up()
    }
}

#[derive(Default)]
pub struct InMemoryContactRepo {
    contacts: Mutex<Vec<Contact>>,
}

impl InMemoryContactRepo {
    fn owned_by(&self, owner_id: Uuid, pred: impl Fn(&Contact) -> bool) -> Vec<Contact> {
        self.contacts
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.owner_id == owner_id && pred(c))
            .cloned()
            .collect()
    }
}

fn clashes(existing: &[Contact], skip: Option<Uuid>, f: &ContactFields) -> bool {
    existing
        .iter()
        .filter(|c| Some(c.id) != skip)
        .any(|c| c.email == f.email || c.phone_number == f.phone_number)
}

#[async_trait]
impl ContactRepo for InMemoryContactRepo {
    async fn list(&self, owner_id: Uuid, limit: i64, offset: i64) -> AppResult<Vec<Contact>> {
        Ok(self
            .owned_by(owner_id, |_| true)
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn get(&self, owner_id: Uuid, id: Uuid) -> AppResult<Option<Contact>> {
        Ok(self.owned_by(owner_id, |c| c.id == id).into_iter().next())
    }

    async fn find_by_first_name(&self, owner_id: Uuid, first_name: &str) -> AppResult<Vec<Contact>> {
        Ok(self.owned_by(owner_id, |c| c.first_name == first_name))
    }

    async fn find_by_last_name(&self, owner_id: Uuid, last_name: &str) -> AppResult<Vec<Contact>> {
        Ok(self.owned_by(owner_id, |c| c.last_name == last_name))
    }

    async fn upcoming_birthdays(&self, owner_id: Uuid, today: Date, days: i64) -> AppResult<Vec<Contact>> {
        let window = birthday_window(today, days);
        let mut rows = self.owned_by(owner_id, |c| in_birthday_window(c.date_of_birth, window));
        sort_by_upcoming(&mut rows, window);
        Ok(rows)
    }

    async fn create(&self, owner_id: Uuid, f: ContactFields) -> AppResult<Contact> {
        let mut contacts = self.contacts.lock().unwrap();
        if clashes(&contacts, None, &f) {
            return Err(AppError::Conflict("Resource already exists".into()));
        }
        let now = OffsetDateTime::now_utc();
        let row = Contact {
            id: Uuid::new_v4(),
            owner_id,
            first_name: f.first_name,
            last_name: f.last_name,
            email: f.email,
            phone_number: f.phone_number,
            date_of_birth: f.date_of_birth,
            description: f.description,
            avatar: None,
            created_at: now,
            updated_at: now,
        };
        contacts.push(row.clone());
        Ok(row)
    }

    async fn update(&self, owner_id: Uuid, id: Uuid, f: ContactFields) -> AppResult<Option<Contact>> {
        let mut contacts = self.contacts.lock().unwrap();
        if !contacts.iter().any(|c| c.id == id && c.owner_id == owner_id) {
            return Ok(None);
        }
        if clashes(&contacts, Some(id), &f) {
            return Err(AppError::Conflict("Resource already exists".into()));
        }
        let c = contacts
            .iter_mut()
            .find(|c| c.id == id)
            .expect("checked above");
        c.first_name = f.first_name;
        c.last_name = f.last_name;
        c.email = f.email;
        c.phone_number = f.phone_number;
        c.date_of_birth = f.date_of_birth;
        c.description = f.description;
        c.updated_at = OffsetDateTime::now_utc();
        Ok(Some(c.clone()))
    }

    async fn delete(&self, owner_id: Uuid, id: Uuid) -> AppResult<Option<Contact>> {
        let mut contacts = self.contacts.lock().unwrap();
        let pos = contacts.iter().position(|c| c.id == id && c.owner_id == owner_id);
        Ok(pos.map(|i| contacts.remove(i)))
    }

    async fn set_avatar(&self, owner_id: Uuid, id: Uuid, url: &str) -> AppResult<Option<Contact>> {
        let mut contacts = self.contacts.lock().unwrap();
        Ok(contacts
            .iter_mut()
            .find(|c| c.id == id && c.owner_id == owner_id)
            .map(|c| {
                c.avatar = Some(url.to_owned());
                c.updated_at = OffsetDateTime::now_utc();
                c.clone()
            }))
    }
}

#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, (Bytes, String)>>,
}

impl FakeStorage {
    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }
}

#[async_trait]
impl StorageClient for FakeStorage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_owned(), (body, content_type.to_owned()));
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://fake.local/{key}")
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<ConfirmationMail>>,
}

impl RecordingMailer {
    /// Waits until at least `n` mails were sent; dispatch runs on a spawned task.
    pub async fn wait_for(&self, n: usize) -> Vec<ConfirmationMail> {
        let poll = async {
            loop {
                {
                    let sent = self.sent.lock().unwrap();
                    if sent.len() >= n {
                        return sent.clone();
                    }
                }
                tokio::time::sleep(StdDuration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(StdDuration::from_secs(2), poll)
            .await
            .unwrap_or_else(|_| panic!("expected {n} confirmation mails"))
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_confirmation(&self, mail: &ConfirmationMail) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

pub struct Fakes {
    pub users: Arc<InMemoryUserRepo>,
    pub contacts: Arc<InMemoryContactRepo>,
    pub storage: Arc<FakeStorage>,
    pub mailer: Arc<RecordingMailer>,
}

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".into(),
        public_url: "http://localhost:8080".into(),
        jwt: JwtConfig {
            secret: "test-secret".into(),
            algorithm: "HS256".into(),
            access_ttl_minutes: 15,
            refresh_ttl_days: 7,
            email_ttl_hours: 24,
        },
        storage: StorageConfig {
            endpoint: "http://localhost:9000".into(),
            bucket: "contacts".into(),
            access_key: "minio".into(),
            secret_key: "minio123".into(),
            region: "us-east-1".into(),
            public_base_url: "https://fake.local".into(),
        },
        mail: MailConfig {
            api_url: None,
            api_key: None,
            from: "noreply@contacts.local".into(),
        },
    }
}

pub fn fake_state() -> (AppState, Fakes) {
    let fakes = Fakes {
        users: Arc::new(InMemoryUserRepo::default()),
        contacts: Arc::new(InMemoryContactRepo::default()),
        storage: Arc::new(FakeStorage::default()),
        mailer: Arc::new(RecordingMailer::default()),
    };
    let state = AppState {
        config: Arc::new(test_config()),
        jwt: test_keys("test-secret"),
        users: fakes.users.clone(),
        contacts: fakes.contacts.clone(),
        storage: fakes.storage.clone(),
        mailer: fakes.mailer.clone(),
    };
    (state, fakes)
}

pub async fn read_json<T: DeserializeOwned>(res: Response) -> T {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

pub async fn send(state: AppState, req: Request<Body>) -> Response {
    crate::app::build_app(state).oneshot(req).await.expect("infallible")
}

/// Inserts a user directly and returns an access token for it.
pub async fn seed_user(state: &AppState, fakes: &Fakes, username: &str, email: &str) -> String {
    fakes
        .users
        .create(NewUser {
            username: username.into(),
            email: email.into(),
            password_hash: hash_password("pw123456").expect("hash"),
        })
        .await
        .expect("seed user");
    state.jwt.sign_access(email).expect("sign access")
}
