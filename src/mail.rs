use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, instrument};

use crate::config::MailConfig;
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationMail {
    pub to: String,
    pub username: String,
    pub link: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_confirmation(&self, mail: &ConfirmationMail) -> anyhow::Result<()>;
}

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: String,
}

/// Posts messages as JSON to an HTTP mail relay.
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(api_url: String, api_key: Option<String>, from: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("build mail http client")?;
        Ok(Self {
            client,
            api_url,
            api_key,
            from,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send_confirmation(&self, mail: &ConfirmationMail) -> anyhow::Result<()> {
        let body = RelayMessage {
            from: &self.from,
            to: &mail.to,
            subject: "Confirm your email",
            html: confirmation_html(mail),
        };
        let mut req = self.client.post(&self.api_url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req.send()
            .await
            .context("mail relay request")?
            .error_for_status()
            .context("mail relay status")?;
        Ok(())
    }
}

/// Used when no relay is configured; the link shows up in the logs.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_confirmation(&self, mail: &ConfirmationMail) -> anyhow::Result<()> {
        info!(to = %mail.to, link = %mail.link, "confirmation mail (log only)");
        Ok(())
    }
}

pub fn from_config(cfg: &MailConfig) -> anyhow::Result<std::sync::Arc<dyn Mailer>> {
    Ok(match &cfg.api_url {
        Some(url) => std::sync::Arc::new(HttpMailer::new(
            url.clone(),
            cfg.api_key.clone(),
            cfg.from.clone(),
        )?),
        None => std::sync::Arc::new(LogMailer),
    })
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn confirmation_html(mail: &ConfirmationMail) -> String {
    format!(
        "<p>Hi {},</p><p>Please confirm your email address by following \
         <a href=\"{}\">this link</a>.</p>",
        escape_html(&mail.username),
        escape_html(&mail.link)
    )
}

pub fn confirmation_link(public_url: &str, token: &str) -> String {
    format!(
        "{}/api/auth/confirmed_email/{}",
        public_url.trim_end_matches('/'),
        token
    )
}

/// Signs a confirmation token and sends the mail on a background task.
/// Delivery failures are logged and never reach the caller.
#[instrument(skip(state, username))]
pub fn dispatch_confirmation(state: &AppState, email: &str, username: &str) {
    let token = match state.jwt.sign_email_confirmation(email) {
        Ok(t) => t,
        Err(e) => {
            error!(error = %e, "sign confirmation token failed");
            return;
        }
    };
    let mail = ConfirmationMail {
        to: email.to_owned(),
        username: username.to_owned(),
        link: confirmation_link(&state.config.public_url, &token),
    };
    let mailer = state.mailer.clone();
    tokio::spawn(async move {
        if let Err(e) = mailer.send_confirmation(&mail).await {
            error!(error = %e, to = %mail.to, "confirmation mail failed");
        }
    });
}
