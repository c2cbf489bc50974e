// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::MailSyncResult;
use crate::modules::imap::types::MessageFlags;
use ahash::AHashMap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A locally stored message. `(folder_id, uid)` is unique and `uid > 0`.
///
/// `to_list`, `cc_list`, and `references` are compact JSON arrays;
/// message-ids keep their angle brackets.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct Message {
    pub id: u64,
    pub account_id: u64,
    pub folder_id: u64,
    pub uid: u32,
    pub from_name: String,
    pub from_email: String,
    pub to_list: String,
    pub cc_list: String,
    pub reply_to: String,
    pub subject: String,
    /// Date header, epoch milliseconds.
    pub date: i64,
    /// IMAP internal date, epoch milliseconds.
    pub received_at: i64,
    pub message_id: String,
    pub in_reply_to: String,
    pub references: String,
    pub size: u32,
    pub is_read: bool,
    pub is_starred: bool,
    pub is_answered: bool,
    pub is_draft: bool,
    pub is_deleted: bool,
    pub is_forwarded: bool,
    pub thread_id: String,
    pub body_text: String,
    pub body_html: String,
    pub snippet: String,
    /// Heuristic until `body_fetched` is true, then parsed truth.
    pub has_attachments: bool,
    pub body_fetched: bool,
    pub smime_raw_body: String,
    pub smime_encrypted: bool,
    pub pgp_raw_body: String,
    pub pgp_encrypted: bool,
    pub read_receipt_to: String,
}

impl Message {
    pub fn apply_flags(&mut self, flags: &MessageFlags) {
        self.is_read = flags.seen;
        self.is_starred = flags.flagged;
        self.is_answered = flags.answered;
        self.is_draft = flags.draft;
        self.is_deleted = flags.deleted;
        self.is_forwarded = flags.forwarded;
    }

    pub fn flags(&self) -> MessageFlags {
        MessageFlags {
            seen: self.is_read,
            flagged: self.is_starred,
            answered: self.is_answered,
            draft: self.is_draft,
            deleted: self.is_deleted,
            forwarded: self.is_forwarded,
        }
    }

    pub fn references_list(&self) -> Vec<String> {
        serde_json::from_str(&self.references).unwrap_or_default()
    }
}

/// One body-phase result destined for a single `update_bodies_batch` call.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BodyUpdate {
    pub message_id: u64,
    pub body_text: String,
    pub body_html: String,
    pub snippet: String,
    pub has_attachments: bool,
    pub smime_raw_body: String,
    pub smime_encrypted: bool,
    pub pgp_raw_body: String,
    pub pgp_encrypted: bool,
}

impl BodyUpdate {
    /// True when the parse produced nothing a viewer could show; such
    /// updates count toward the per-session parse-failure throttle.
    pub fn is_empty(&self) -> bool {
        self.body_text.is_empty()
            && self.body_html.is_empty()
            && !self.smime_encrypted
            && !self.pgp_encrypted
    }
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Creates the message and returns the assigned id.
    async fn create(&self, message: &Message) -> MailSyncResult<u64>;
    async fn get(&self, id: u64) -> MailSyncResult<Option<Message>>;
    async fn get_by_uid(&self, folder_id: u64, uid: u32) -> MailSyncResult<Option<Message>>;
    async fn get_all_uids(&self, folder_id: u64) -> MailSyncResult<Vec<u32>>;
    async fn get_message_uid_and_folder(&self, id: u64) -> MailSyncResult<Option<(u32, u64)>>;
    async fn get_message_uids_and_folder(
        &self,
        ids: &[u64],
    ) -> MailSyncResult<AHashMap<u64, (u32, u64)>>;
    async fn count_messages_without_body(
        &self,
        folder_id: u64,
        since: Option<i64>,
    ) -> MailSyncResult<u64>;
    /// Candidate rows `(id, size)` for body fetching, oldest received first.
    async fn get_messages_without_body_and_size(
        &self,
        folder_id: u64,
        limit: usize,
        since: Option<i64>,
    ) -> MailSyncResult<Vec<(u64, u32)>>;
    async fn count_unread_by_folder(&self, folder_id: u64) -> MailSyncResult<u32>;
    async fn update_body(&self, update: &BodyUpdate) -> MailSyncResult<()>;
    /// Commits every update in one transaction. Updates with visible
    /// content (or an encrypted envelope) flip `body_fetched`; empty
    /// updates persist their fields but leave it false, so only the
    /// in-session failure throttle keeps them out of candidate queries
    /// and a later session retries them.
    async fn update_bodies_batch(&self, updates: &[BodyUpdate]) -> MailSyncResult<()>;
    /// Applies one batch of `(uid, flags)` pairs in a single transaction.
    async fn update_flags_by_uid_batch(
        &self,
        folder_id: u64,
        flags: &[(u32, MessageFlags)],
    ) -> MailSyncResult<()>;
    async fn update_thread_id(&self, id: u64, thread_id: &str) -> MailSyncResult<()>;
    /// Looks up an existing thread by message-id, in-reply-to, or any entry
    /// in references.
    async fn find_thread_id(
        &self,
        account_id: u64,
        message_id: &str,
        in_reply_to: &str,
        references: &[String],
    ) -> MailSyncResult<Option<String>>;
    /// Links already-known messages whose headers reference `message_id`
    /// into that message's thread (and vice versa).
    async fn reconcile_threads_for_new_message(
        &self,
        account_id: u64,
        message_id: &str,
    ) -> MailSyncResult<()>;
    async fn delete_by_uid(&self, folder_id: u64, uids: &[u32]) -> MailSyncResult<()>;
    async fn delete_by_folder(&self, folder_id: u64) -> MailSyncResult<()>;
    async fn delete_older_than(&self, folder_id: u64, cutoff: i64) -> MailSyncResult<u64>;
}
