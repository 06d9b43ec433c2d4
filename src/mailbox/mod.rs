//! Mailbox access: paged listing of unread mail, full fetch, mark-read.

pub mod gmail;

pub use gmail::GmailSource;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use crate::error::MailboxError;

/// Identifier of an unread message as returned by listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

impl MessageRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            thread_id: None,
        }
    }
}

/// Full content of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    /// Raw `From` header (may include a display name and `<address>`).
    pub sender: String,
    pub subject: String,
    /// Short plain-text preview. May be empty.
    pub snippet: String,
    pub unread: bool,
}

/// One page of an unread listing.
#[derive(Debug, Clone, Default)]
pub struct UnreadPage {
    pub refs: Vec<MessageRef>,
    /// Token for the next page; `None` on the last page.
    pub next_page_token: Option<String>,
}

/// Read/mark access to a mailbox.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Fetch one page of unread message ids.
    async fn list_unread_page(
        &self,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<UnreadPage, MailboxError>;

    /// Fetch the full message. `NotFound` if it no longer exists.
    async fn fetch_full(&self, id: &str) -> Result<Message, MailboxError>;

    /// Clear the unread flag. Succeeds if the message is already read.
    async fn mark_read(&self, id: &str) -> Result<(), MailboxError>;
}

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Lazily page through every unread message id.
///
/// Pages are requested only as the stream is polled. Each call starts a
/// fresh listing of the mailbox's current state.
pub fn list_unread(
    source: &dyn MessageSource,
    page_size: u32,
) -> BoxStream<'_, Result<MessageRef, MailboxError>> {
    stream::try_unfold(Cursor::Start, move |cursor| async move {
        let token = match cursor {
            Cursor::Done => return Ok::<_, MailboxError>(None),
            Cursor::Start => None,
            Cursor::Next(token) => Some(token),
        };
        let page = source.list_unread_page(page_size, token.as_deref()).await?;
        let next = match page.next_page_token {
            Some(token) if !token.is_empty() => Cursor::Next(token),
            _ => Cursor::Done,
        };
        Ok::<_, MailboxError>(Some((
            stream::iter(page.refs.into_iter().map(Ok::<_, MailboxError>)),
            next,
        )))
    })
    .try_flatten()
    .boxed()
}

/// Collect the full unread listing.
pub async fn collect_unread(
    source: &dyn MessageSource,
    page_size: u32,
) -> Result<Vec<MessageRef>, MailboxError> {
    list_unread(source, page_size).try_collect().await
}
