// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::MailSyncResult;
use crate::modules::imap::types::SpecialUse;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Semantic role of a folder. User overrides beat auto-detection from the
/// server's special-use attributes.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub enum FolderType {
    Inbox,
    Sent,
    Drafts,
    Trash,
    Spam,
    Archive,
    AllMail,
    Starred,
    #[default]
    Folder,
}

impl FolderType {
    pub fn from_special_use(special_use: Option<SpecialUse>, path: &str) -> Self {
        match special_use {
            Some(SpecialUse::All) => FolderType::AllMail,
            Some(SpecialUse::Archive) => FolderType::Archive,
            Some(SpecialUse::Drafts) => FolderType::Drafts,
            Some(SpecialUse::Flagged) => FolderType::Starred,
            Some(SpecialUse::Junk) => FolderType::Spam,
            Some(SpecialUse::Sent) => FolderType::Sent,
            Some(SpecialUse::Trash) => FolderType::Trash,
            None if path.eq_ignore_ascii_case("INBOX") => FolderType::Inbox,
            None => FolderType::Folder,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct Folder {
    /// The unique identifier for the folder. Zero until the store assigns one.
    pub id: u64,
    pub account_id: u64,
    /// Full server path, unique per account (e.g. "INBOX/Receipts").
    pub path: String,
    /// Leaf name derived from the delimiter-split path.
    pub name: String,
    /// Hierarchy delimiter reported by the server (e.g. "/" or ".").
    pub delimiter: Option<String>,
    pub folder_type: FolderType,
    /// Path of the parent folder, derived from the delimiter-split path.
    pub parent_path: Option<String>,
    /// UID validity cookie; all local UIDs are invalid when it changes.
    pub uid_validity: u32,
    pub uid_next: u32,
    pub highest_modseq: u64,
    pub total_count: u32,
    pub unread_count: u32,
    /// Epoch milliseconds of the last completed sync for this folder.
    pub last_sync: i64,
}

impl Folder {
    /// Leaf name and parent path from a delimiter-split full path.
    pub fn split_path(path: &str, delimiter: Option<&str>) -> (String, Option<String>) {
        match delimiter.filter(|d| !d.is_empty()) {
            Some(delim) => match path.rfind(delim) {
                Some(idx) => (
                    path[idx + delim.len()..].to_string(),
                    Some(path[..idx].to_string()),
                ),
                None => (path.to_string(), None),
            },
            None => (path.to_string(), None),
        }
    }
}

#[async_trait]
pub trait FolderStore: Send + Sync {
    async fn list(&self, account_id: u64) -> MailSyncResult<Vec<Folder>>;
    async fn get(&self, id: u64) -> MailSyncResult<Option<Folder>>;
    async fn get_by_type(
        &self,
        account_id: u64,
        folder_type: FolderType,
    ) -> MailSyncResult<Option<Folder>>;
    /// Creates the folder and returns the assigned id.
    async fn create(&self, folder: &Folder) -> MailSyncResult<u64>;
    async fn update(&self, folder: &Folder) -> MailSyncResult<()>;
    async fn delete(&self, id: u64) -> MailSyncResult<()>;
}
