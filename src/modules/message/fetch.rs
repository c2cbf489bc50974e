// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::account::Account;
use crate::modules::error::{code::ErrorCode, MailSyncResult};
use crate::modules::imap::pool::return_connection;
use crate::modules::imap::types::FetchProfile;
use crate::modules::mime::{snippet::make_snippet, MAX_RAW_MESSAGE_SIZE};
use crate::modules::store::attachment::Attachment;
use crate::modules::store::folder::Folder;
use crate::modules::store::message::Message;
use crate::modules::sync::bodies::fetch_single_body;
use crate::modules::sync::context::SyncContext;
use crate::modules::sync::messages::build_message_from_header;
use crate::modules::sync::threads::resolve_thread_id;
use crate::raise_error;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// On-demand body fetch for a single stored message: resolve its UID and
/// folder, select, run the body-fetch path for just that message, and
/// return the updated row.
pub async fn fetch_message_body(
    ctx: &SyncContext,
    account: &Account,
    message_id: u64,
    token: &CancellationToken,
) -> MailSyncResult<Message> {
    let (uid, folder_id) = ctx
        .messages
        .get_message_uid_and_folder(message_id)
        .await?
        .ok_or_else(|| {
            raise_error!(
                format!("message {} not found", message_id),
                ErrorCode::ResourceNotFound
            )
        })?;
    let folder = ctx.folders.get(folder_id).await?.ok_or_else(|| {
        raise_error!(
            format!("folder {} not found", folder_id),
            ErrorCode::ResourceNotFound
        )
    })?;

    let mut conn = ctx.pool.get_connection(token, account.id).await?;
    let result = async {
        conn.select_mailbox(&folder.path).await?;
        fetch_single_body(ctx, conn.as_mut(), message_id, uid, token).await
    }
    .await;
    let suspect = result
        .as_ref()
        .err()
        .map(|e| e.is_connection_error())
        .unwrap_or(false);
    return_connection(ctx.pool.as_ref(), conn, suspect).await;
    result?;

    ctx.messages.get(message_id).await?.ok_or_else(|| {
        raise_error!(
            format!("message {} vanished after body fetch", message_id),
            ErrorCode::ResourceNotFound
        )
    })
}

/// Raw RFC 5322 bytes of one message, capped at 50 MiB.
pub async fn fetch_raw_message(
    ctx: &SyncContext,
    account: &Account,
    folder: &Folder,
    uid: u32,
    token: &CancellationToken,
) -> MailSyncResult<Vec<u8>> {
    let fetched = fetch_one(ctx, account, folder, uid, token).await?;
    let mut raw = fetched.body.unwrap_or_default();
    if raw.len() > MAX_RAW_MESSAGE_SIZE {
        warn!(
            "raw message uid {} of {} bytes exceeds the {} byte cap, truncating",
            uid,
            raw.len(),
            MAX_RAW_MESSAGE_SIZE
        );
        raw.truncate(MAX_RAW_MESSAGE_SIZE);
    }
    Ok(raw)
}

/// Fetches a message that a server-side search surfaced but the local
/// store does not hold: parse, persist with its body, and return the new
/// row.
pub async fn fetch_server_message(
    ctx: &SyncContext,
    account: &Account,
    folder: &Folder,
    uid: u32,
    token: &CancellationToken,
) -> MailSyncResult<Message> {
    if let Some(existing) = ctx.messages.get_by_uid(folder.id, uid).await? {
        if existing.body_fetched {
            return Ok(existing);
        }
        return fetch_message_body(ctx, account, existing.id, token).await;
    }

    let fetched = fetch_one(ctx, account, folder, uid, token).await?;
    let mut raw = fetched.body.clone().unwrap_or_default();
    if raw.len() > MAX_RAW_MESSAGE_SIZE {
        raw.truncate(MAX_RAW_MESSAGE_SIZE);
    }

    let mut message = build_message_from_header(account.id, folder.id, &fetched);
    let parsed = ctx.parser.parse_with_deadline(Arc::new(raw)).await;
    message.body_text = parsed.body_text;
    message.body_html = if parsed.body_html.is_empty() {
        String::new()
    } else {
        ctx.sanitizer.sanitize(&parsed.body_html)
    };
    message.snippet = make_snippet(&message.body_text, &message.body_html);
    message.has_attachments = parsed.has_attachments || !parsed.attachments.is_empty();
    message.smime_raw_body = parsed.smime_raw;
    message.smime_encrypted = parsed.smime_encrypted;
    message.pgp_raw_body = parsed.pgp_raw;
    message.pgp_encrypted = parsed.pgp_encrypted;
    message.body_fetched = !message.body_text.is_empty()
        || !message.body_html.is_empty()
        || message.smime_encrypted
        || message.pgp_encrypted;
    message.thread_id = resolve_thread_id(
        ctx.messages.as_ref(),
        account.id,
        &message.message_id,
        &message.in_reply_to,
        &message.references_list(),
    )
    .await?;

    let store_id = ctx.messages.create(&message).await?;
    if !message.message_id.is_empty() {
        ctx.messages
            .reconcile_threads_for_new_message(account.id, &message.message_id)
            .await?;
    }
    if !parsed.attachments.is_empty() {
        let attachments: Vec<Attachment> = parsed
            .attachments
            .into_iter()
            .map(|att| Attachment {
                id: 0,
                message_id: store_id,
                filename: att.filename,
                content_type: att.content_type,
                content_id: att.content_id,
                is_inline: att.is_inline,
                size: att.size,
                content: att.content,
            })
            .collect();
        ctx.attachments.create_batch(&attachments).await?;
    }

    ctx.messages.get(store_id).await?.ok_or_else(|| {
        raise_error!(
            format!("message {} vanished after creation", store_id),
            ErrorCode::ResourceNotFound
        )
    })
}

/// Selects the folder and streams exactly one full message.
async fn fetch_one(
    ctx: &SyncContext,
    account: &Account,
    folder: &Folder,
    uid: u32,
    token: &CancellationToken,
) -> MailSyncResult<crate::modules::imap::types::FetchedMessage> {
    let mut conn = ctx.pool.get_connection(token, account.id).await?;
    let result = async {
        conn.select_mailbox(&folder.path).await?;
        let mut stream = conn.fetch(&uid.to_string(), FetchProfile::Body).await?;
        let mut found = None;
        loop {
            match stream.next().await? {
                Some(fetched) if fetched.uid == uid => {
                    found = Some(fetched);
                }
                Some(_) => {}
                None => break,
            }
        }
        let _ = stream.close().await;
        found.ok_or_else(|| {
            raise_error!(
                format!("message uid {} not found in '{}'", uid, folder.path),
                ErrorCode::ResourceNotFound
            )
        })
    }
    .await;
    let suspect = result
        .as_ref()
        .err()
        .map(|e| e.is_connection_error())
        .unwrap_or(false);
    return_connection(ctx.pool.as_ref(), conn, suspect).await;
    result
}
