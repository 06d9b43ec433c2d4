//! Inbox Digest: unread mail summarized and categorized by a local model.

pub mod auth;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod mailbox;
pub mod oracle;
pub mod pipeline;
pub mod store;
