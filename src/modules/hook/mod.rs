// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::MailSyncError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum SyncPhase {
    Folders,
    Messages,
    Headers,
    Bodies,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncPhase::Folders => "folders",
            SyncPhase::Messages => "messages",
            SyncPhase::Headers => "headers",
            SyncPhase::Bodies => "bodies",
        };
        f.write_str(s)
    }
}

/// Progress snapshot carried on the progress callback.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct SyncProgress {
    pub account_id: u64,
    pub folder_id: u64,
    pub fetched: u64,
    pub total: u64,
    pub phase: SyncPhase,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct NewMailInfo {
    pub account_id: u64,
    pub account_name: String,
    pub folder_id: u64,
    pub count: u32,
}

/// Host-supplied callbacks. Every sync reaches a terminal callback:
/// success, cancellation, or error.
pub trait SyncHook: Send + Sync {
    fn on_progress(&self, _progress: SyncProgress) {}
    fn on_new_mail(&self, _info: NewMailInfo) {}
    fn on_sync_completed(&self, _account_id: u64, _folder_id: u64, _error: Option<&MailSyncError>) {
    }
}

/// Default hook for hosts that observe nothing.
pub struct NoopHook;

impl SyncHook for NoopHook {}
