use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Flow a token is valid for. Confirmation tokens carry no scope.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenScope {
    AccessToken,
    RefreshToken,
}

/// The three kinds of tokens the service issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
    EmailConfirmation,
}

impl TokenKind {
    pub fn scope(self) -> Option<TokenScope> {
        match self {
            TokenKind::Access => Some(TokenScope::AccessToken),
            TokenKind::Refresh => Some(TokenScope::RefreshToken),
            TokenKind::EmailConfirmation => None,
        }
    }
}

/// JWT payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String, // user email
    pub iat: i64,
    pub exp: i64,
    /// Unique per token, so two tokens minted in the same second still differ.
    pub jti: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<TokenScope>,
}
