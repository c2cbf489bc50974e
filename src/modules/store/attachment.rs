// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::MailSyncResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Attachment metadata plus, for small inline parts, the content itself.
/// Inline parts over the cap and all regular attachments store metadata
/// only and are fetched on demand.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct Attachment {
    pub id: u64,
    pub message_id: u64,
    pub filename: String,
    pub content_type: String,
    pub content_id: String,
    pub is_inline: bool,
    pub size: u32,
    pub content: Option<Vec<u8>>,
}

#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn create(&self, attachment: &Attachment) -> MailSyncResult<u64>;
    async fn create_batch(&self, attachments: &[Attachment]) -> MailSyncResult<()>;
}
