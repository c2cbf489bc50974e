// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use serde::{Deserialize, Serialize};

/// RFC 6154 special-use attribute reported by LIST.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum SpecialUse {
    All,
    Archive,
    Drafts,
    Flagged,
    Junk,
    Sent,
    Trash,
}

/// One LIST response entry.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RemoteMailbox {
    pub path: String,
    pub delimiter: Option<String>,
    pub special_use: Option<SpecialUse>,
    pub no_select: bool,
}

/// STATUS response for one mailbox.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct MailboxStatus {
    pub uid_validity: u32,
    pub uid_next: u32,
    pub highest_modseq: u64,
    pub messages: u32,
    pub unseen: Option<u32>,
}

/// SELECT response for one mailbox.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SelectedMailbox {
    pub uid_validity: u32,
    pub uid_next: u32,
    pub highest_modseq: u64,
    pub exists: u32,
}

/// The message flags the local store models. The Recent flag is dropped at
/// the transport seam.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct MessageFlags {
    pub seen: bool,
    pub flagged: bool,
    pub answered: bool,
    pub draft: bool,
    pub deleted: bool,
    pub forwarded: bool,
}

impl MessageFlags {
    pub fn from_strs<S: AsRef<str>>(flags: &[S]) -> Self {
        let mut parsed = MessageFlags::default();
        for flag in flags {
            match flag.as_ref() {
                f if f.eq_ignore_ascii_case("\\Seen") => parsed.seen = true,
                f if f.eq_ignore_ascii_case("\\Flagged") => parsed.flagged = true,
                f if f.eq_ignore_ascii_case("\\Answered") => parsed.answered = true,
                f if f.eq_ignore_ascii_case("\\Draft") => parsed.draft = true,
                f if f.eq_ignore_ascii_case("\\Deleted") => parsed.deleted = true,
                f if f.eq_ignore_ascii_case("$Forwarded") => parsed.forwarded = true,
                _ => {}
            }
        }
        parsed
    }
}

/// A single RFC 5322 address.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct Address {
    pub name: String,
    pub email: String,
}

/// Compact JSON encoding used for the persisted `to_list`/`cc_list` shapes.
pub fn addresses_to_json(addresses: &[Address]) -> String {
    serde_json::to_string(addresses).unwrap_or_else(|_| "[]".into())
}

/// RFC 3501 envelope summary used for search hits that are not stored
/// locally.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct ImapEnvelope {
    pub from_name: String,
    pub from_email: String,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub reply_to: String,
    pub subject: String,
    /// Epoch milliseconds.
    pub date: i64,
    pub message_id: String,
    pub in_reply_to: String,
}

/// Which items a FETCH should request.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FetchProfile {
    /// UID and flags only.
    Flags,
    /// UID, flags, size, internal date, and the header section (peek).
    Headers,
    /// UID, flags, size, internal date, and the parsed envelope.
    Envelope,
    /// UID, flags, size, and the full body literal (peek).
    Body,
}

/// One streamed FETCH response message. Fields are populated according to
/// the requested [`FetchProfile`].
#[derive(Clone, Debug, Default)]
pub struct FetchedMessage {
    pub uid: u32,
    pub flags: Vec<String>,
    pub size: u32,
    /// Epoch milliseconds.
    pub internal_date: Option<i64>,
    pub envelope: Option<ImapEnvelope>,
    pub header: Option<Vec<u8>>,
    pub body: Option<Vec<u8>>,
}

impl FetchedMessage {
    pub fn message_flags(&self) -> MessageFlags {
        MessageFlags::from_strs(&self.flags)
    }
}
