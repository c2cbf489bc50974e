// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::MailSyncResult;
use async_trait::async_trait;
use types::{FetchProfile, FetchedMessage, MailboxStatus, RemoteMailbox, SelectedMailbox};

pub mod pool;
pub mod search;
pub mod types;

pub use pool::ConnectionPool;

/// One borrowed IMAP connection. The transport layer implements this; the
/// core only issues commands through it.
#[async_trait]
pub trait ImapConnection: Send {
    async fn list_mailboxes(&mut self) -> MailSyncResult<Vec<RemoteMailbox>>;
    async fn mailbox_status(&mut self, path: &str) -> MailSyncResult<MailboxStatus>;
    async fn select_mailbox(&mut self, path: &str) -> MailSyncResult<SelectedMailbox>;
    /// UID SEARCH with a raw criteria string; returns the matching UIDs.
    async fn uid_search(&mut self, criteria: &str) -> MailSyncResult<Vec<u32>>;
    /// UID FETCH over a sequence-set. The returned stream MUST be consumed
    /// message by message; collecting is forbidden so a hanging connection
    /// stays survivable.
    async fn fetch<'a>(
        &'a mut self,
        uid_set: &str,
        profile: FetchProfile,
    ) -> MailSyncResult<Box<dyn FetchStream + Send + 'a>>;
}

/// Streaming view over one FETCH command.
#[async_trait]
pub trait FetchStream {
    async fn next(&mut self) -> MailSyncResult<Option<FetchedMessage>>;
    async fn close(&mut self) -> MailSyncResult<()>;
}
