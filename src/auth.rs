//! Credential handle shared by the mailbox and spreadsheet clients.
//!
//! The interactive consent flow happens out-of-band. This module loads the
//! cached token file it produces. When the file carries refresh material the
//! access token is minted and renewed by a yup-oauth2 authorized-user
//! authenticator; otherwise the cached access token is used as-is until it
//! expires.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use google_gmail1::common::GetToken;
use google_gmail1::yup_oauth2::{self, authorized_user::AuthorizedUserSecret};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::AuthError;

/// Scopes requested from the authenticator: modify mail labels, edit sheets.
pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/spreadsheets",
];

/// Treat a cached token as expired this long before its recorded expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Supplies bearer tokens for the mailbox and spreadsheet APIs.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Return a currently valid access token.
    async fn access_token(&self) -> Result<SecretString, AuthError>;
}

/// On-disk token file layout.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenFile {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

impl TokenFile {
    /// Whether the access token is expired (or about to be) at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(exp) => now + ChronoDuration::seconds(EXPIRY_SKEW_SECS) >= exp,
            None => false,
        }
    }

    fn authorized_user(&self) -> Option<AuthorizedUserSecret> {
        fn present(v: &Option<String>) -> Option<&str> {
            v.as_deref().map(str::trim).filter(|s| !s.is_empty())
        }
        Some(AuthorizedUserSecret {
            client_id: present(&self.client_id)?.to_string(),
            client_secret: present(&self.client_secret)?.to_string(),
            refresh_token: present(&self.refresh_token)?.to_string(),
            key_type: "authorized_user".to_string(),
        })
    }
}

/// How access tokens are obtained for a given token file.
#[derive(Debug)]
pub enum TokenPlan {
    /// Refresh material present: the authenticator owns the access token,
    /// whatever the cached `access_token` holds.
    Refresh(AuthorizedUserSecret),
    /// Cached access token only, valid until `expires_at`.
    Cached {
        token: String,
        expires_at: Option<DateTime<Utc>>,
    },
}

/// Decide how tokens will be obtained. A file with neither refresh material
/// nor a non-blank access token is `AuthError::Missing`.
pub fn plan_tokens(path: &Path, token: &TokenFile) -> Result<TokenPlan, AuthError> {
    if let Some(secret) = token.authorized_user() {
        return Ok(TokenPlan::Refresh(secret));
    }
    if token.access_token.trim().is_empty() {
        return Err(AuthError::Missing {
            path: path.display().to_string(),
            reason: "access_token is empty and no refresh_token/client_id/client_secret are present"
                .into(),
        });
    }
    Ok(TokenPlan::Cached {
        token: token.access_token.clone(),
        expires_at: token.expires_at,
    })
}

enum TokenSource {
    Authenticator(Box<dyn GetToken>),
    Cached(TokenFile),
}

/// Credential provider backed by a cached JSON token file.
pub struct TokenFileCredentials {
    path: PathBuf,
    source: TokenSource,
}

impl TokenFileCredentials {
    /// Load the token file. A missing or unreadable file is `AuthError::Missing`.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let path = path.as_ref().to_path_buf();
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| AuthError::Missing {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        let token = parse_token_file(&path, &raw)?;

        let source = match plan_tokens(&path, &token)? {
            TokenPlan::Refresh(secret) => {
                let auth = yup_oauth2::AuthorizedUserAuthenticator::builder(secret)
                    .build()
                    .await
                    .map_err(|e| AuthError::Refresh(format!("failed to build authenticator: {e}")))?;
                TokenSource::Authenticator(Box::new(auth))
            }
            TokenPlan::Cached { token, expires_at } => TokenSource::Cached(TokenFile {
                access_token: token,
                expires_at,
                ..TokenFile::default()
            }),
        };

        info!(
            path = %path.display(),
            refreshable = matches!(source, TokenSource::Authenticator(_)),
            "Credentials loaded"
        );
        Ok(Self { path, source })
    }
}

#[async_trait]
impl CredentialProvider for TokenFileCredentials {
    async fn access_token(&self) -> Result<SecretString, AuthError> {
        match &self.source {
            TokenSource::Authenticator(auth) => {
                debug!("Requesting access token from authenticator");
                let token = auth
                    .get_token(SCOPES)
                    .await
                    .map_err(|e| AuthError::Refresh(e.to_string()))?
                    .ok_or_else(|| AuthError::Refresh("authenticator returned no token".into()))?;
                Ok(SecretString::from(token))
            }
            TokenSource::Cached(token) => {
                if token.is_expired(Utc::now()) {
                    return Err(AuthError::Expired(format!(
                        "{} has no refresh_token/client_id/client_secret",
                        self.path.display()
                    )));
                }
                Ok(SecretString::from(token.access_token.clone()))
            }
        }
    }
}

/// Credential provider with a fixed token (no refresh).
pub struct StaticToken(SecretString);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn access_token(&self) -> Result<SecretString, AuthError> {
        Ok(SecretString::from(self.0.expose_secret().to_string()))
    }
}

fn parse_token_file(path: &Path, raw: &str) -> Result<TokenFile, AuthError> {
    serde_json::from_str(raw).map_err(|e| AuthError::Malformed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}
