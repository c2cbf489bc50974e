// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::account::Account;
use crate::modules::error::{code::ErrorCode, MailSyncError, MailSyncResult};
use crate::modules::hook::SyncPhase;
use crate::modules::imap::pool::return_connection;
use crate::modules::imap::types::FetchProfile;
use crate::modules::imap::ImapConnection;
use crate::modules::mime::{snippet::make_snippet, BodyParser, MAX_RAW_MESSAGE_SIZE};
use crate::modules::security::HtmlSanitizer;
use crate::modules::store::attachment::Attachment;
use crate::modules::store::folder::Folder;
use crate::modules::store::message::BodyUpdate;
use crate::modules::sync::context::SyncContext;
use crate::modules::utils::compress_uid_list;
use crate::raise_error;
use ahash::AHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const CANDIDATE_QUERY_LIMIT: usize = 200;
const MAX_BATCH_MESSAGES: usize = 50;
const MAX_BATCH_BYTES: u64 = 512 * 1024;
const LARGE_MAILBOX_THRESHOLD: u64 = 1000;
const LARGE_MAX_BATCH_MESSAGES: usize = 25;
const LARGE_MAX_BATCH_BYTES: u64 = 256 * 1024;
const MAX_PARSE_FAILURES: u32 = 3;
const MAX_CONNECTION_FAILURES: u32 = 3;
const MAX_CONSECUTIVE_BATCH_FAILURES: u32 = 3;
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Output of one processing stage run: ready-to-commit body updates plus
/// their attachments, and the ids whose parse produced nothing visible.
struct ProcessingOutcome {
    updates: Vec<BodyUpdate>,
    attachments: Vec<Attachment>,
    empty_ids: Vec<u64>,
}

/// Fetches, parses, sanitizes, and persists bodies for every message in
/// the folder still lacking one, over a single pinned connection, with the
/// IMAP fetch of batch n+1 overlapping the parse of batch n. DB writes are
/// serialized: batch n commits before the candidate query for batch n+1.
pub async fn fetch_missing_bodies(
    ctx: &SyncContext,
    account: &Account,
    folder: &Folder,
    token: &CancellationToken,
) -> MailSyncResult<()> {
    let since = account.window_cutoff();
    let total = ctx
        .messages
        .count_messages_without_body(folder.id, since)
        .await?;
    if total == 0 {
        // 1/1 rather than 0/0 so a listening UI reads 100%
        ctx.emit_progress(account.id, folder.id, 1, 1, SyncPhase::Bodies);
        return Ok(());
    }

    let (max_messages, max_bytes) = if total > LARGE_MAILBOX_THRESHOLD {
        (LARGE_MAX_BATCH_MESSAGES, LARGE_MAX_BATCH_BYTES)
    } else {
        (MAX_BATCH_MESSAGES, MAX_BATCH_BYTES)
    };
    info!(
        "Account {}: folder '{}' has {} message(s) without bodies, batching at {} msgs / {} KiB",
        account.id,
        folder.path,
        total,
        max_messages,
        max_bytes / 1024
    );

    let mut conn = ctx.pool.get_connection(token, account.id).await?;
    if let Err(e) = conn.select_mailbox(&folder.path).await {
        return_connection(ctx.pool.as_ref(), conn, e.is_connection_error()).await;
        return Err(e);
    }

    let fetched_count = Arc::new(AtomicU64::new(0));
    let failed_count = Arc::new(AtomicU64::new(0));
    let heartbeat_token = token.child_token();
    let heartbeat = tokio::spawn(run_heartbeat(
        account.id,
        folder.path.clone(),
        total,
        fetched_count.clone(),
        failed_count.clone(),
        heartbeat_token.clone(),
    ));

    let result = run_pipeline(
        ctx,
        account,
        folder,
        &mut conn,
        token,
        since,
        total,
        max_messages,
        max_bytes,
        &fetched_count,
        &failed_count,
    )
    .await;

    heartbeat_token.cancel();
    let _ = heartbeat.await;

    // terminal progress so observers unstick even on cancel or error
    ctx.emit_progress(
        account.id,
        folder.id,
        fetched_count.load(Ordering::Relaxed).min(total),
        total,
        SyncPhase::Bodies,
    );

    let suspect = result
        .as_ref()
        .err()
        .map(|e| e.is_connection_error())
        .unwrap_or(false);
    return_connection(ctx.pool.as_ref(), conn, suspect).await;
    result
}

#[allow(clippy::too_many_arguments)]
async fn run_pipeline(
    ctx: &SyncContext,
    account: &Account,
    folder: &Folder,
    conn: &mut Box<dyn ImapConnection>,
    token: &CancellationToken,
    since: Option<i64>,
    total: u64,
    max_messages: usize,
    max_bytes: u64,
    fetched_count: &Arc<AtomicU64>,
    failed_count: &Arc<AtomicU64>,
) -> MailSyncResult<()> {
    let mut failed_attempts: AHashMap<u64, u32> = AHashMap::new();
    let mut connection_failures = 0u32;
    let mut consecutive_batch_failures = 0u32;
    let mut pending: Option<JoinHandle<ProcessingOutcome>> = None;

    loop {
        // Stage 1: commit the previous iteration's parse results before
        // querying new candidates, so the query never races the writes.
        if let Some(handle) = pending.take() {
            let outcome = handle
                .await
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
            apply_outcome(
                ctx,
                account,
                folder,
                outcome,
                total,
                &mut failed_attempts,
                fetched_count,
                failed_count,
            )
            .await?;
        }

        if token.is_cancelled() {
            return Err(MailSyncError::cancelled());
        }

        // Stage 2: query and greedy-pack the next batch.
        let candidates = ctx
            .messages
            .get_messages_without_body_and_size(folder.id, CANDIDATE_QUERY_LIMIT, since)
            .await?;
        let batch = pack_batch(&candidates, &failed_attempts, max_messages, max_bytes);
        if batch.is_empty() {
            return Ok(());
        }

        let ids: Vec<u64> = batch.iter().map(|(id, _)| *id).collect();
        let uid_map = ctx.messages.get_message_uids_and_folder(&ids).await?;
        let mut uid_to_id: AHashMap<u32, u64> = AHashMap::with_capacity(ids.len());
        for id in &ids {
            if let Some((uid, _)) = uid_map.get(id) {
                uid_to_id.insert(*uid, *id);
            }
        }
        if uid_to_id.is_empty() {
            // rows vanished between query and resolve; they are no longer
            // candidates, nothing to fetch
            for id in &ids {
                failed_attempts.insert(*id, MAX_PARSE_FAILURES);
            }
            continue;
        }
        let uid_set = compress_uid_list(uid_to_id.keys().copied().collect());

        // Stage 3 + 4: issue the FETCH and stream the literals.
        match stream_bodies(conn.as_mut(), &uid_set, &uid_to_id, token).await {
            Ok(raw_bodies) => {
                consecutive_batch_failures = 0;
                if raw_bodies.is_empty() {
                    // the server answered with nothing for a non-empty
                    // request; poison these ids for the session
                    warn!(
                        "Account {}: folder '{}' batch '{}' returned zero bodies, excluding {} message(s) this session",
                        account.id,
                        folder.path,
                        uid_set,
                        ids.len()
                    );
                    failed_count.fetch_add(ids.len() as u64, Ordering::Relaxed);
                    for id in &ids {
                        failed_attempts.insert(*id, MAX_PARSE_FAILURES);
                    }
                    continue;
                }
                // Stage 5: hand off to the parse task and loop; the next
                // fetch overlaps this parse.
                pending = Some(spawn_processing(
                    ctx.parser.clone(),
                    ctx.sanitizer.clone(),
                    raw_bodies,
                ));
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) if e.is_connection_error() => {
                connection_failures += 1;
                if connection_failures > MAX_CONNECTION_FAILURES {
                    warn!(
                        "Account {}: folder '{}' body phase aborting after {} connection failures",
                        account.id, folder.path, connection_failures
                    );
                    return Err(e);
                }
                warn!(
                    "Account {}: folder '{}' body fetch connection failure {}/{}, re-acquiring: {}",
                    account.id, folder.path, connection_failures, MAX_CONNECTION_FAILURES, e
                );
                let dead =
                    std::mem::replace(conn, ctx.pool.get_connection(token, account.id).await?);
                ctx.pool.discard(dead).await;
                conn.select_mailbox(&folder.path).await?;
                // retry the same batch: nothing was committed for it
            }
            Err(e) => {
                consecutive_batch_failures += 1;
                warn!(
                    "Account {}: folder '{}' body batch '{}' failed ({}/{}): {}",
                    account.id,
                    folder.path,
                    uid_set,
                    consecutive_batch_failures,
                    MAX_CONSECUTIVE_BATCH_FAILURES,
                    e
                );
                if consecutive_batch_failures >= MAX_CONSECUTIVE_BATCH_FAILURES {
                    return Err(e);
                }
                // keep the batch out of the next query so the phase advances
                for id in &ids {
                    *failed_attempts.entry(*id).or_insert(0) += 1;
                }
            }
        }
    }
}

/// Greedy pack bounded by count and cumulative size, always admitting at
/// least one message so oversized emails still flow.
fn pack_batch(
    candidates: &[(u64, u32)],
    failed_attempts: &AHashMap<u64, u32>,
    max_messages: usize,
    max_bytes: u64,
) -> Vec<(u64, u32)> {
    let mut batch = Vec::new();
    let mut bytes = 0u64;
    for &(id, size) in candidates {
        if failed_attempts
            .get(&id)
            .map(|n| *n >= MAX_PARSE_FAILURES)
            .unwrap_or(false)
        {
            continue;
        }
        if batch.len() >= max_messages {
            break;
        }
        if !batch.is_empty() && bytes + size as u64 > max_bytes {
            break;
        }
        bytes += size as u64;
        batch.push((id, size));
    }
    batch
}

/// Streams one FETCH response message by message, capping each body
/// literal at 50 MiB.
async fn stream_bodies(
    conn: &mut dyn ImapConnection,
    uid_set: &str,
    uid_to_id: &AHashMap<u32, u64>,
    token: &CancellationToken,
) -> MailSyncResult<Vec<(u64, Arc<Vec<u8>>)>> {
    let mut stream = conn.fetch(uid_set, FetchProfile::Body).await?;
    let mut raw_bodies = Vec::new();
    loop {
        if token.is_cancelled() {
            let _ = stream.close().await;
            return Err(MailSyncError::cancelled());
        }
        let fetched = match stream.next().await {
            Ok(Some(fetched)) => fetched,
            Ok(None) => break,
            Err(e) => return Err(e),
        };
        let Some(&message_id) = uid_to_id.get(&fetched.uid) else {
            continue;
        };
        let mut body = fetched.body.unwrap_or_default();
        if body.len() > MAX_RAW_MESSAGE_SIZE {
            warn!(
                "message uid {} body literal of {} bytes exceeds the {} byte cap, truncating",
                fetched.uid,
                body.len(),
                MAX_RAW_MESSAGE_SIZE
            );
            body.truncate(MAX_RAW_MESSAGE_SIZE);
        }
        raw_bodies.push((message_id, Arc::new(body)));
    }
    let _ = stream.close().await;
    Ok(raw_bodies)
}

/// The CPU-bound stage: parse under the per-message deadline, sanitize,
/// snippet, and shape the store writes. Runs detached so the next IMAP
/// fetch can proceed.
fn spawn_processing(
    parser: BodyParser,
    sanitizer: Arc<dyn HtmlSanitizer>,
    raw_bodies: Vec<(u64, Arc<Vec<u8>>)>,
) -> JoinHandle<ProcessingOutcome> {
    tokio::spawn(async move {
        let mut updates = Vec::with_capacity(raw_bodies.len());
        let mut attachments = Vec::new();
        let mut empty_ids = Vec::new();

        for (message_id, raw) in raw_bodies {
            let parsed = parser.parse_with_deadline(raw).await;
            let body_html = if parsed.body_html.is_empty() {
                String::new()
            } else {
                sanitizer.sanitize(&parsed.body_html)
            };
            let snippet = make_snippet(&parsed.body_text, &body_html);
            let update = BodyUpdate {
                message_id,
                body_text: parsed.body_text,
                body_html,
                snippet,
                has_attachments: parsed.has_attachments || !parsed.attachments.is_empty(),
                smime_raw_body: parsed.smime_raw,
                smime_encrypted: parsed.smime_encrypted,
                pgp_raw_body: parsed.pgp_raw,
                pgp_encrypted: parsed.pgp_encrypted,
            };
            if update.is_empty() {
                empty_ids.push(message_id);
            }
            for att in parsed.attachments {
                attachments.push(Attachment {
                    id: 0,
                    message_id,
                    filename: att.filename,
                    content_type: att.content_type,
                    content_id: att.content_id,
                    is_inline: att.is_inline,
                    size: att.size,
                    content: att.content,
                });
            }
            updates.push(update);
        }

        ProcessingOutcome {
            updates,
            attachments,
            empty_ids,
        }
    })
}

#[allow(clippy::too_many_arguments)]
async fn apply_outcome(
    ctx: &SyncContext,
    account: &Account,
    folder: &Folder,
    outcome: ProcessingOutcome,
    total: u64,
    failed_attempts: &mut AHashMap<u64, u32>,
    fetched_count: &Arc<AtomicU64>,
    failed_count: &Arc<AtomicU64>,
) -> MailSyncResult<()> {
    if outcome.updates.is_empty() {
        return Ok(());
    }
    ctx.messages.update_bodies_batch(&outcome.updates).await?;
    if !outcome.attachments.is_empty() {
        ctx.attachments.create_batch(&outcome.attachments).await?;
    }
    for id in &outcome.empty_ids {
        let attempts = failed_attempts.entry(*id).or_insert(0);
        *attempts += 1;
        if *attempts >= MAX_PARSE_FAILURES {
            debug!(
                "Account {}: message {} parsed empty {} time(s), excluding for this session",
                account.id, id, attempts
            );
            failed_count.fetch_add(1, Ordering::Relaxed);
        }
    }
    let fetched = fetched_count.fetch_add(outcome.updates.len() as u64, Ordering::Relaxed)
        + outcome.updates.len() as u64;
    ctx.emit_progress(
        account.id,
        folder.id,
        fetched.min(total),
        total,
        SyncPhase::Bodies,
    );
    Ok(())
}

async fn run_heartbeat(
    account_id: u64,
    folder_path: String,
    total: u64,
    fetched: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
    token: CancellationToken,
) {
    let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
    interval.tick().await; // discard the immediate tick
    loop {
        tokio::select! {
            _ = interval.tick() => {
                info!(
                    "Account {}: body fetch heartbeat for '{}': {}/{} fetched, {} failed",
                    account_id,
                    folder_path,
                    fetched.load(Ordering::Relaxed),
                    total,
                    failed.load(Ordering::Relaxed)
                );
            }
            _ = token.cancelled() => break,
        }
    }
}

/// On-demand single-message body fetch, sharing the batch path's parse,
/// sanitize, and persistence shape. The mailbox must already be selected
/// on `conn`.
pub(crate) async fn fetch_single_body(
    ctx: &SyncContext,
    conn: &mut dyn ImapConnection,
    message_id: u64,
    uid: u32,
    token: &CancellationToken,
) -> MailSyncResult<()> {
    let mut uid_to_id = AHashMap::with_capacity(1);
    uid_to_id.insert(uid, message_id);
    let raw_bodies = stream_bodies(conn, &uid.to_string(), &uid_to_id, token).await?;
    if raw_bodies.is_empty() {
        return Err(raise_error!(
            format!("message uid {} not found on the server", uid),
            ErrorCode::ResourceNotFound
        ));
    }
    let outcome = spawn_processing(ctx.parser.clone(), ctx.sanitizer.clone(), raw_bodies)
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
    for update in &outcome.updates {
        ctx.messages.update_body(update).await?;
    }
    if !outcome.attachments.is_empty() {
        ctx.attachments.create_batch(&outcome.attachments).await?;
    }
    Ok(())
}
