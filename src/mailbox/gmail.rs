//! Gmail client on the generated `google-gmail1` hub.
//!
//! The hub asks for bearer tokens through `ProviderToken`, which forwards to
//! the shared `CredentialProvider` so the mailbox and the spreadsheet store
//! use one token source.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use google_gmail1::Gmail;
use google_gmail1::api::{ListMessagesResponse, Message as GmailMessage, ModifyMessageRequest};
use google_gmail1::common::GetToken;
use google_gmail1::hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use secrecy::ExposeSecret;
use tracing::{debug, info};

use crate::auth::CredentialProvider;
use crate::error::{AuthError, MailboxError};
use crate::mailbox::{Message, MessageRef, MessageSource, UnreadPage};

const USER: &str = "me";

const UNREAD_LABEL: &str = "UNREAD";

type TokenFuture<'a> = Pin<
    Box<dyn Future<Output = Result<Option<String>, Box<dyn std::error::Error + Send + Sync>>> + Send + 'a>,
>;

/// Hands the hub tokens from a `CredentialProvider`.
#[derive(Clone)]
struct ProviderToken(Arc<dyn CredentialProvider>);

impl GetToken for ProviderToken {
    fn get_token<'a>(&'a self, _scopes: &'a [&str]) -> TokenFuture<'a> {
        Box::pin(async move {
            let token = self.0.access_token().await?;
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(Some(token.expose_secret().to_string()))
        })
    }
}

/// Gmail mailbox for the authenticated user.
pub struct GmailSource {
    hub: Gmail<HttpsConnector<HttpConnector>>,
}

impl GmailSource {
    pub fn new(credentials: Arc<dyn CredentialProvider>) -> Result<Self, MailboxError> {
        let connector = HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| MailboxError::Client(format!("failed to load native TLS roots: {e}")))?
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            hub: Gmail::new(client, ProviderToken(credentials)),
        })
    }

    /// List label names. Used as a connectivity check.
    pub async fn labels(&self) -> Result<Vec<String>, MailboxError> {
        let (_, body) = self
            .hub
            .users()
            .labels_list(USER)
            .doit()
            .await
            .map_err(|e| classify(e, None))?;
        Ok(body
            .labels
            .unwrap_or_default()
            .into_iter()
            .filter_map(|l| l.name)
            .collect())
    }
}

#[async_trait]
impl MessageSource for GmailSource {
    fn name(&self) -> &str {
        "gmail"
    }

    async fn list_unread_page(
        &self,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<UnreadPage, MailboxError> {
        let mut call = self
            .hub
            .users()
            .messages_list(USER)
            .add_label_ids(UNREAD_LABEL)
            .max_results(page_size);
        if let Some(page_token) = page_token {
            call = call.page_token(page_token);
        }

        let (_, body) = call
            .doit()
            .await
            .map_err(|e| MailboxError::Listing(e.to_string()))?;

        let page = into_page(body);
        debug!(count = page.refs.len(), more = page.next_page_token.is_some(), "Listed unread page");
        Ok(page)
    }

    async fn fetch_full(&self, id: &str) -> Result<Message, MailboxError> {
        let (_, raw) = self
            .hub
            .users()
            .messages_get(USER, id)
            .format("full")
            .doit()
            .await
            .map_err(|e| classify(e, Some(id)))?;
        Ok(parse_message(id, raw))
    }

    async fn mark_read(&self, id: &str) -> Result<(), MailboxError> {
        let request = ModifyMessageRequest {
            remove_label_ids: Some(vec![UNREAD_LABEL.to_string()]),
            add_label_ids: None,
        };
        self.hub
            .users()
            .messages_modify(request, USER, id)
            .doit()
            .await
            .map_err(|e| MailboxError::MarkRead {
                id: id.to_string(),
                reason: e.to_string(),
            })?;
        info!(id, "Message marked as read");
        Ok(())
    }
}

/// Whether the hub error is an HTTP 404, either as a raw failure or as a
/// decoded `{"error": {"code": 404}}` body.
fn is_not_found(err: &google_gmail1::Error) -> bool {
    match err {
        google_gmail1::Error::Failure(response) => response.status().as_u16() == 404,
        google_gmail1::Error::BadRequest(body) => {
            body.pointer("/error/code").and_then(|c| c.as_u64()) == Some(404)
        }
        _ => false,
    }
}

/// Map hub errors to `Auth`, `NotFound` (404 on a known id) or `Transient`.
fn classify(err: google_gmail1::Error, id: Option<&str>) -> MailboxError {
    if let Some(id) = id {
        if is_not_found(&err) {
            return MailboxError::NotFound { id: id.to_string() };
        }
    }
    match err {
        google_gmail1::Error::MissingToken(e) => match e.downcast::<AuthError>() {
            Ok(auth) => MailboxError::Auth(*auth),
            Err(e) => MailboxError::Transient(e.to_string()),
        },
        other => MailboxError::Transient(other.to_string()),
    }
}

fn into_page(body: ListMessagesResponse) -> UnreadPage {
    UnreadPage {
        refs: body
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| {
                Some(MessageRef {
                    id: m.id?,
                    thread_id: m.thread_id,
                })
            })
            .collect(),
        next_page_token: body.next_page_token.filter(|t| !t.is_empty()),
    }
}

fn parse_message(id: &str, raw: GmailMessage) -> Message {
    let headers = raw
        .payload
        .and_then(|p| p.headers)
        .unwrap_or_default();
    let header = |name: &str| {
        headers
            .iter()
            .find(|h| h.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(name)))
            .and_then(|h| h.value.clone())
            .unwrap_or_default()
    };

    Message {
        sender: header("From"),
        subject: header("Subject"),
        unread: raw
            .label_ids
            .as_deref()
            .unwrap_or_default()
            .iter()
            .any(|l| l == UNREAD_LABEL),
        snippet: raw.snippet.unwrap_or_default(),
        id: raw.id.unwrap_or_else(|| id.to_string()),
    }
}
