// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::account::Account;
use crate::modules::error::{MailSyncError, MailSyncResult};
use crate::modules::hook::SyncPhase;
use crate::modules::imap::pool::return_connection;
use crate::modules::imap::search::since_criteria;
use crate::modules::imap::types::{Address, FetchProfile, FetchedMessage, MessageFlags};
use crate::modules::imap::ImapConnection;
use crate::modules::store::folder::Folder;
use crate::modules::store::message::Message;
use crate::modules::sync::context::SyncContext;
use crate::modules::sync::threads::{resolve_thread_id, ThreadLinker};
use crate::modules::utils::generate_uid_sequence;
use crate::utc_now;
use ahash::{AHashMap, AHashSet};
use mail_parser::{HeaderValue, MessageParser};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const FLAG_BATCH_SIZE: usize = 500;
const HEADER_BATCH_SIZE: usize = 50;
const MAX_CONNECTION_FAILURES: u32 = 3;

/// Reconciles one folder's message set against the server: UIDVALIDITY
/// check, windowed or full UID search, deletes, flag sync for the overlap,
/// and header fetches for new UIDs in streamed batches with connection
/// recovery.
pub async fn sync_messages(
    ctx: &SyncContext,
    account: &Account,
    folder: &Folder,
    token: &CancellationToken,
) -> MailSyncResult<()> {
    let mut conn = ctx.pool.get_connection(token, account.id).await?;
    let result = sync_messages_inner(ctx, account, folder, &mut conn, token).await;
    let suspect = result
        .as_ref()
        .err()
        .map(|e| e.is_connection_error())
        .unwrap_or(false);
    return_connection(ctx.pool.as_ref(), conn, suspect).await;
    result
}

async fn sync_messages_inner(
    ctx: &SyncContext,
    account: &Account,
    folder: &Folder,
    conn: &mut Box<dyn ImapConnection>,
    token: &CancellationToken,
) -> MailSyncResult<()> {
    let account_id = account.id;
    let mut folder = folder.clone();

    let selected = conn.select_mailbox(&folder.path).await?;
    // STATUS carries the authoritative unseen count
    let status = conn.mailbox_status(&folder.path).await?;

    if folder.uid_validity != 0 && folder.uid_validity != selected.uid_validity {
        info!(
            "Account {}: folder '{}' UIDVALIDITY changed ({} -> {}); the mailbox was recreated, purging local messages",
            account_id, folder.path, folder.uid_validity, selected.uid_validity
        );
        ctx.messages.delete_by_folder(folder.id).await?;
    }
    folder.uid_validity = selected.uid_validity;

    let window_cutoff = account.window_cutoff();
    if let Some(cutoff) = window_cutoff {
        let purged = ctx.messages.delete_older_than(folder.id, cutoff).await?;
        if purged > 0 {
            debug!(
                "Account {}: folder '{}' purged {} message(s) outside the {}-day window",
                account_id, folder.path, purged, account.sync_window_days
            );
        }
    }

    let criteria = match window_cutoff {
        Some(cutoff) => since_criteria(cutoff),
        None => "ALL".to_string(),
    };
    let server_uids = conn.uid_search(&criteria).await?;
    let local_uids = ctx.messages.get_all_uids(folder.id).await?;

    // Refuse to act on an ambiguous zero-result search: update last_sync
    // only and make the condition visible.
    if server_uids.is_empty() && !local_uids.is_empty() && window_cutoff.is_none() {
        warn!(
            "Account {}: folder '{}' returned an empty UID set while {} local messages exist; \
             refusing destructive reconciliation this cycle",
            account_id,
            folder.path,
            local_uids.len()
        );
        folder.last_sync = utc_now!();
        ctx.folders.update(&folder).await?;
        return Ok(());
    }

    let server_set: AHashSet<u32> = server_uids.iter().copied().collect();
    let local_set: AHashSet<u32> = local_uids.iter().copied().collect();
    let new_uids: Vec<u32> = server_set.difference(&local_set).copied().collect();
    let deleted_uids: Vec<u32> = local_set.difference(&server_set).copied().collect();
    let existing_uids: Vec<u32> = server_set.intersection(&local_set).copied().collect();

    if local_uids.len() > 10
        && deleted_uids.len() > local_uids.len() / 2
        && window_cutoff.is_none()
    {
        // Deliberately a warning, not an abort: emptying a folder by hand
        // legitimately produces this shape.
        warn!(
            "Account {}: folder '{}' would delete {} of {} local messages; proceeding, but this \
             may indicate a server-side anomaly",
            account_id,
            folder.path,
            deleted_uids.len(),
            local_uids.len()
        );
    }

    if !deleted_uids.is_empty() {
        ctx.messages.delete_by_uid(folder.id, &deleted_uids).await?;
        debug!(
            "Account {}: folder '{}' deleted {} message(s) gone from the server",
            account_id,
            folder.path,
            deleted_uids.len()
        );
    }

    let mut connection_failures = 0u32;

    sync_flags(
        ctx,
        account,
        &folder,
        conn,
        existing_uids,
        token,
        &mut connection_failures,
    )
    .await?;

    fetch_new_headers(
        ctx,
        account,
        &folder,
        conn,
        new_uids,
        token,
        &mut connection_failures,
    )
    .await?;

    // Final folder state; prefer the server's unseen count.
    folder.uid_next = selected.uid_next;
    folder.highest_modseq = selected.highest_modseq;
    folder.total_count = selected.exists;
    folder.unread_count = match status.unseen {
        Some(unseen) => unseen,
        None => ctx.messages.count_unread_by_folder(folder.id).await?,
    };
    folder.last_sync = utc_now!();
    ctx.folders.update(&folder).await?;

    Ok(())
}

/// Flag sync for UIDs present on both sides, applied in one transaction
/// per 500-UID chunk.
async fn sync_flags(
    ctx: &SyncContext,
    account: &Account,
    folder: &Folder,
    conn: &mut Box<dyn ImapConnection>,
    mut existing_uids: Vec<u32>,
    token: &CancellationToken,
    connection_failures: &mut u32,
) -> MailSyncResult<()> {
    if existing_uids.is_empty() {
        return Ok(());
    }
    existing_uids.sort_unstable();
    let total = existing_uids.len() as u64;
    let batches = generate_uid_sequence(existing_uids, FLAG_BATCH_SIZE, false);

    let mut processed = 0u64;
    let mut index = 0usize;
    while index < batches.len() {
        if token.is_cancelled() {
            return Err(MailSyncError::cancelled());
        }
        let uid_set = &batches[index];
        match fetch_flag_batch(conn.as_mut(), uid_set, token).await {
            Ok(flags) => {
                processed += flags.len() as u64;
                ctx.messages
                    .update_flags_by_uid_batch(folder.id, &flags)
                    .await?;
                ctx.emit_progress(
                    account.id,
                    folder.id,
                    processed.min(total),
                    total,
                    SyncPhase::Messages,
                );
                index += 1;
            }
            Err(e) => {
                recover_or_abort(ctx, account, folder, conn, token, connection_failures, e)
                    .await?;
            }
        }
    }
    Ok(())
}

async fn fetch_flag_batch(
    conn: &mut dyn ImapConnection,
    uid_set: &str,
    token: &CancellationToken,
) -> MailSyncResult<Vec<(u32, MessageFlags)>> {
    let mut stream = conn.fetch(uid_set, FetchProfile::Flags).await?;
    let mut flags = Vec::new();
    loop {
        if token.is_cancelled() {
            let _ = stream.close().await;
            return Err(MailSyncError::cancelled());
        }
        match stream.next().await? {
            Some(fetched) => flags.push((fetched.uid, fetched.message_flags())),
            None => break,
        }
    }
    let _ = stream.close().await;
    Ok(flags)
}

/// Header phase: newest first, batches of 50, streamed message by message
/// and persisted immediately so cancellation loses nothing already seen.
async fn fetch_new_headers(
    ctx: &SyncContext,
    account: &Account,
    folder: &Folder,
    conn: &mut Box<dyn ImapConnection>,
    mut new_uids: Vec<u32>,
    token: &CancellationToken,
    connection_failures: &mut u32,
) -> MailSyncResult<()> {
    if new_uids.is_empty() {
        return Ok(());
    }
    new_uids.sort_unstable();
    let total = new_uids.len() as u64;
    let batches = generate_uid_sequence(new_uids, HEADER_BATCH_SIZE, true);

    info!(
        "Account {}: folder '{}' has {} new message UID(s), fetching headers in {} batch(es)",
        account.id,
        folder.path,
        total,
        batches.len()
    );

    let mut fetched_total = 0u64;
    let mut index = 0usize;
    while index < batches.len() {
        if token.is_cancelled() {
            return Err(MailSyncError::cancelled());
        }
        let uid_set = &batches[index];
        match fetch_header_batch(ctx, account, folder, conn.as_mut(), uid_set, token).await {
            Ok(saved) => {
                fetched_total += saved as u64;
                ctx.emit_progress(
                    account.id,
                    folder.id,
                    fetched_total,
                    total,
                    SyncPhase::Headers,
                );
                index += 1;
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) if e.is_connection_error() => {
                recover_or_abort(ctx, account, folder, conn, token, connection_failures, e)
                    .await?;
            }
            Err(e) => {
                warn!(
                    "Account {}: header batch '{}' failed, advancing: {}",
                    account.id, uid_set, e
                );
                index += 1;
            }
        }
    }
    Ok(())
}

/// Shared connection recovery: discard the dead connection, borrow a fresh
/// one, re-select, and let the caller retry the same batch. More than
/// three recoveries abort the sync.
async fn recover_or_abort(
    ctx: &SyncContext,
    account: &Account,
    folder: &Folder,
    conn: &mut Box<dyn ImapConnection>,
    token: &CancellationToken,
    connection_failures: &mut u32,
    error: MailSyncError,
) -> MailSyncResult<()> {
    if error.is_cancelled() || !error.is_connection_error() {
        return Err(error);
    }
    *connection_failures += 1;
    if *connection_failures > MAX_CONNECTION_FAILURES {
        warn!(
            "Account {}: folder '{}' aborting after {} connection failures: {}",
            account.id, folder.path, connection_failures, error
        );
        return Err(error);
    }
    warn!(
        "Account {}: folder '{}' connection failure {}/{}, re-acquiring: {}",
        account.id, folder.path, connection_failures, MAX_CONNECTION_FAILURES, error
    );
    let dead = std::mem::replace(
        conn,
        ctx.pool.get_connection(token, account.id).await?,
    );
    ctx.pool.discard(dead).await;
    conn.select_mailbox(&folder.path).await?;
    Ok(())
}

async fn fetch_header_batch(
    ctx: &SyncContext,
    account: &Account,
    folder: &Folder,
    conn: &mut dyn ImapConnection,
    uid_set: &str,
    token: &CancellationToken,
) -> MailSyncResult<usize> {
    struct SavedHeader {
        message_id: String,
        thread_id: String,
        store_id: u64,
        linker_node: usize,
    }

    let mut stream = conn.fetch(uid_set, FetchProfile::Headers).await?;
    let mut linker = ThreadLinker::new();
    let mut saved: Vec<SavedHeader> = Vec::new();

    let stream_result = loop {
        if token.is_cancelled() {
            break Err(MailSyncError::cancelled());
        }
        let fetched = match stream.next().await {
            Ok(Some(fetched)) => fetched,
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        };
        if fetched.uid == 0 {
            continue;
        }
        let mut message = build_message_from_header(account.id, folder.id, &fetched);
        message.thread_id = resolve_thread_id(
            ctx.messages.as_ref(),
            account.id,
            &message.message_id,
            &message.in_reply_to,
            &message.references_list(),
        )
        .await?;
        let node = linker.add_message(
            &message.message_id,
            &message.in_reply_to,
            &message.references_list(),
        );
        // Persist immediately; a cancel between messages keeps what landed.
        let store_id = ctx.messages.create(&message).await?;
        saved.push(SavedHeader {
            message_id: message.message_id,
            thread_id: message.thread_id,
            store_id,
            linker_node: node,
        });
    };
    let _ = stream.close().await;
    drop(stream);

    // In-batch thread grouping: messages of one batch that reference each
    // other adopt a single thread id before store-level reconciliation.
    let mut group_thread: AHashMap<usize, String> = AHashMap::new();
    for header in &saved {
        let root = linker.root(header.linker_node);
        group_thread
            .entry(root)
            .or_insert_with(|| header.thread_id.clone());
    }
    for header in &saved {
        let root = linker.root(header.linker_node);
        if let Some(thread_id) = group_thread.get(&root) {
            if !thread_id.is_empty() && thread_id != &header.thread_id {
                ctx.messages
                    .update_thread_id(header.store_id, thread_id)
                    .await?;
            }
        }
        if !header.message_id.is_empty() {
            ctx.messages
                .reconcile_threads_for_new_message(account.id, &header.message_id)
                .await?;
        }
    }

    stream_result?;
    Ok(saved.len())
}

/// Builds a local message row from a streamed header fetch. The attachment
/// flag here is a loose header-substring heuristic so the UI can show a
/// paper-clip before bodies arrive; the body phase overwrites it with the
/// parsed truth.
pub(crate) fn build_message_from_header(
    account_id: u64,
    folder_id: u64,
    fetched: &FetchedMessage,
) -> Message {
    let header_bytes: &[u8] = fetched
        .header
        .as_deref()
        .or(fetched.body.as_deref())
        .unwrap_or(&[]);

    let mut message = Message {
        account_id,
        folder_id,
        uid: fetched.uid,
        size: fetched.size,
        received_at: fetched.internal_date.unwrap_or_else(|| utc_now!()),
        to_list: "[]".into(),
        cc_list: "[]".into(),
        references: "[]".into(),
        ..Default::default()
    };
    message.apply_flags(&fetched.message_flags());
    message.date = message.received_at;

    if let Some(parsed) = MessageParser::default().parse(header_bytes) {
        if let Some(from) = parsed.from().and_then(|a| addr_vec(a).into_iter().next()) {
            message.from_name = from.name;
            message.from_email = from.email;
        }
        message.to_list = crate::modules::imap::types::addresses_to_json(
            &parsed.to().map(addr_vec).unwrap_or_default(),
        );
        message.cc_list = crate::modules::imap::types::addresses_to_json(
            &parsed.cc().map(addr_vec).unwrap_or_default(),
        );
        message.reply_to = parsed
            .reply_to()
            .and_then(|a| addr_vec(a).into_iter().next())
            .map(|a| a.email)
            .unwrap_or_default();
        message.subject = parsed.subject().unwrap_or("").to_string();
        if let Some(date) = parsed.date() {
            message.date = date.to_timestamp() * 1000;
        }
        message.message_id = parsed
            .message_id()
            .map(with_angle_brackets)
            .unwrap_or_default();
        message.in_reply_to = parsed
            .in_reply_to()
            .as_text()
            .map(with_angle_brackets)
            .unwrap_or_default();
        message.references = serde_json::to_string(&extract_references(parsed.references()))
            .unwrap_or_else(|_| "[]".into());
        message.read_receipt_to =
            crate::modules::mime::header_text(&parsed, "disposition-notification-to")
                .unwrap_or_default();
    }

    message.has_attachments = header_hints_attachments(header_bytes);
    message
}

fn header_hints_attachments(header: &[u8]) -> bool {
    let haystack = String::from_utf8_lossy(header).to_ascii_lowercase();
    haystack.contains("multipart/mixed") || haystack.contains("application/")
}

fn with_angle_brackets(id: &str) -> String {
    let id = id.trim();
    if id.starts_with('<') {
        id.to_string()
    } else {
        format!("<{}>", id)
    }
}

fn extract_references(value: &HeaderValue<'_>) -> Vec<String> {
    match value {
        HeaderValue::Text(text) => vec![with_angle_brackets(text)],
        HeaderValue::TextList(list) => list.iter().map(|t| with_angle_brackets(t)).collect(),
        _ => Vec::new(),
    }
}

pub(crate) fn addr_vec(address: &mail_parser::Address<'_>) -> Vec<Address> {
    fn convert(addr: &mail_parser::Addr<'_>) -> Address {
        Address {
            name: addr.name.as_deref().unwrap_or("").to_string(),
            email: addr.address.as_deref().unwrap_or("").to_string(),
        }
    }
    match address {
        mail_parser::Address::List(list) => list.iter().map(convert).collect(),
        mail_parser::Address::Group(groups) => groups
            .iter()
            .flat_map(|g| g.addresses.iter())
            .map(convert)
            .collect(),
    }
}
