use std::str::FromStr;

use anyhow::Context;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::{Claims, TokenKind, TokenScope};
use crate::config::JwtConfig;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
    #[error("token scope mismatch: expected {expected:?}, found {found:?}")]
    ScopeMismatch {
        expected: TokenScope,
        found: Option<TokenScope>,
    },
}

/// Signing and verification keys plus token lifetimes.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    algorithm: Algorithm,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub email_ttl: Duration,
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> anyhow::Result<Self> {
        let algorithm = Algorithm::from_str(&cfg.algorithm)
            .with_context(|| format!("unknown JWT algorithm {}", cfg.algorithm))?;
        anyhow::ensure!(
            matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512),
            "JWT algorithm {:?} needs an asymmetric key pair; use HS256, HS384 or HS512",
            algorithm
        );
        anyhow::ensure!(!cfg.secret.is_empty(), "JWT secret is empty");

        Ok(Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            algorithm,
            access_ttl: Duration::minutes(cfg.access_ttl_minutes),
            refresh_ttl: Duration::days(cfg.refresh_ttl_days),
            email_ttl: Duration::hours(cfg.email_ttl_hours),
        })
    }

    pub fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
            TokenKind::EmailConfirmation => self.email_ttl,
        }
    }

    pub fn issue_with_ttl(&self, kind: TokenKind, email: &str, ttl: Duration) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: email.to_owned(),
            iat: now.unix_timestamp(),
            exp: (now + ttl).unix_timestamp(),
            jti: Uuid::new_v4(),
            scope: kind.scope(),
        };
        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding)
            .context("jwt encode")?;
        debug!(kind = ?kind, "jwt signed");
        Ok(token)
    }

    pub fn issue(&self, kind: TokenKind, email: &str) -> anyhow::Result<String> {
        self.issue_with_ttl(kind, email, self.ttl(kind))
    }

    pub fn sign_access(&self, email: &str) -> anyhow::Result<String> {
        self.issue(TokenKind::Access, email)
    }

    pub fn sign_refresh(&self, email: &str) -> anyhow::Result<String> {
        self.issue(TokenKind::Refresh, email)
    }

    pub fn sign_email_confirmation(&self, email: &str) -> anyhow::Result<String> {
        self.issue(TokenKind::EmailConfirmation, email)
    }

    /// Verifies signature and expiry, then the scope expected for `kind`.
    /// Confirmation tokens are accepted on signature and expiry alone.
    pub fn decode(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        let claims = decode::<Claims>(token, &self.decoding, &validation)?.claims;

        if let Some(expected) = kind.scope() {
            if claims.scope != Some(expected) {
                return Err(TokenError::ScopeMismatch {
                    expected,
                    found: claims.scope,
                });
            }
        }
        debug!(kind = ?kind, "jwt verified");
        Ok(claims)
    }

    pub fn decode_access(&self, token: &str) -> Result<Claims, TokenError> {
        self.decode(token, TokenKind::Access)
    }

    pub fn decode_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        self.decode(token, TokenKind::Refresh)
    }

    pub fn decode_email_confirmation(&self, token: &str) -> Result<Claims, TokenError> {
        self.decode(token, TokenKind::EmailConfirmation)
    }
}

#[cfg(test)]
pub(crate) fn test_keys(secret: &str) -> JwtKeys {
    JwtKeys::from_config(&JwtConfig {
        secret: secret.into(),
        algorithm: "HS256".into(),
        access_ttl_minutes: 15,
        refresh_ttl_days: 7,
        email_ttl_hours: 24,
    })
    .expect("valid test jwt config")
}
