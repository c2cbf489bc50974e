// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::account::Account;
use crate::modules::error::{code::ErrorCode, MailSyncError, MailSyncResult};
use crate::modules::hook::SyncPhase;
use crate::modules::imap::pool::return_connection;
use crate::modules::imap::types::{MailboxStatus, RemoteMailbox};
use crate::modules::store::folder::{Folder, FolderType};
use crate::modules::sync::context::SyncContext;
use crate::raise_error;
use ahash::{AHashMap, AHashSet};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const STATUS_CONCURRENCY: usize = 5;

/// Reconciles the local folder list against the server for one account:
/// LIST, STATUS fan-out, create/update, then deletion of folders the
/// server no longer reports. A STATUS failure skips that folder for this
/// cycle; a LIST failure aborts the cycle.
pub async fn sync_folders(
    ctx: &SyncContext,
    account: &Account,
    token: &CancellationToken,
) -> MailSyncResult<()> {
    let account_id = account.id;

    let mut conn = ctx.pool.get_connection(token, account_id).await?;
    let listed = match conn.list_mailboxes().await {
        Ok(listed) => {
            ctx.pool.release(conn).await;
            listed
        }
        Err(e) => {
            return_connection(ctx.pool.as_ref(), conn, e.is_connection_error()).await;
            return Err(e);
        }
    };
    if listed.is_empty() {
        return Err(raise_error!(
            format!(
                "Account {}: IMAP server returned no mailboxes; refusing to treat this as mass deletion",
                account_id
            ),
            ErrorCode::ImapUnexpectedResult
        ));
    }

    let statuses = fetch_statuses(ctx, account_id, &listed, token).await?;

    let local = ctx.folders.list(account_id).await?;
    let local_by_path: AHashMap<&str, &Folder> =
        local.iter().map(|f| (f.path.as_str(), f)).collect();

    let total = statuses.len() as u64;
    for (index, (mailbox, status)) in statuses.iter().enumerate() {
        if token.is_cancelled() {
            return Err(MailSyncError::cancelled());
        }
        persist_folder(ctx, account, mailbox, status, local_by_path.get(mailbox.path.as_str()))
            .await?;
        ctx.emit_progress(account_id, 0, (index + 1) as u64, total, SyncPhase::Folders);
    }

    // Deletion is driven by LIST, never by STATUS failures.
    let listed_paths: AHashSet<&str> = listed.iter().map(|m| m.path.as_str()).collect();
    for folder in &local {
        if !listed_paths.contains(folder.path.as_str()) {
            info!(
                "Account {}: folder '{}' no longer on the server, deleting locally",
                account_id, folder.path
            );
            ctx.folders.delete(folder.id).await?;
        }
    }

    Ok(())
}

/// STATUS fan-out across at most five workers, each borrowing its own
/// connection. Failures are logged and the folder is skipped this cycle.
async fn fetch_statuses(
    ctx: &SyncContext,
    account_id: u64,
    listed: &[RemoteMailbox],
    token: &CancellationToken,
) -> MailSyncResult<Vec<(RemoteMailbox, MailboxStatus)>> {
    let semaphore = Arc::new(Semaphore::new(STATUS_CONCURRENCY));
    let mut handles = Vec::new();

    for mailbox in listed.iter().filter(|m| !m.no_select).cloned() {
        if token.is_cancelled() {
            return Err(MailSyncError::cancelled());
        }
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        let pool = ctx.pool.clone();
        let token = token.clone();
        let handle: tokio::task::JoinHandle<(RemoteMailbox, MailSyncResult<MailboxStatus>)> =
            tokio::spawn(async move {
                let _permit = permit;
                let mut conn = match pool.get_connection(&token, account_id).await {
                    Ok(conn) => conn,
                    Err(e) => return (mailbox, Err(e)),
                };
                let status = conn.mailbox_status(&mailbox.path).await;
                let suspect = status.as_ref().err().map(|e| e.is_connection_error());
                return_connection(pool.as_ref(), conn, suspect.unwrap_or(false)).await;
                (mailbox, status)
            });
        handles.push(handle);
    }

    let mut statuses = Vec::with_capacity(handles.len());
    for joined in join_all(handles).await {
        let (mailbox, status) =
            joined.map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        match status {
            Ok(status) => statuses.push((mailbox, status)),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!(
                    "Account {}: STATUS failed for '{}', skipping this cycle: {}",
                    account_id, mailbox.path, e
                );
            }
        }
    }
    Ok(statuses)
}

async fn persist_folder(
    ctx: &SyncContext,
    account: &Account,
    mailbox: &RemoteMailbox,
    status: &MailboxStatus,
    existing: Option<&&Folder>,
) -> MailSyncResult<()> {
    let folder_type = account
        .override_for(&mailbox.path)
        .unwrap_or_else(|| FolderType::from_special_use(mailbox.special_use, &mailbox.path));
    let (name, parent_path) = Folder::split_path(&mailbox.path, mailbox.delimiter.as_deref());

    match existing {
        Some(existing) => {
            let mut folder = (**existing).clone();
            folder.name = name;
            folder.delimiter = mailbox.delimiter.clone();
            folder.folder_type = folder_type;
            folder.parent_path = parent_path;
            // uid_validity adoption and total_count are the message
            // reconciler's call: writing the server values here would mask a
            // mailbox recreation and zero out the new-mail delta
            folder.uid_next = status.uid_next;
            folder.highest_modseq = status.highest_modseq;
            if let Some(unseen) = status.unseen {
                folder.unread_count = unseen;
            }
            ctx.folders.update(&folder).await?;
        }
        None => {
            let folder = Folder {
                id: 0,
                account_id: account.id,
                path: mailbox.path.clone(),
                name,
                delimiter: mailbox.delimiter.clone(),
                folder_type,
                parent_path,
                uid_validity: status.uid_validity,
                uid_next: status.uid_next,
                highest_modseq: status.highest_modseq,
                total_count: status.messages,
                unread_count: status.unseen.unwrap_or(0),
                last_sync: 0,
            };
            let id = ctx.folders.create(&folder).await?;
            debug!(
                "Account {}: created folder '{}' (id {}, type {:?})",
                account.id, folder.path, id, folder_type
            );
        }
    }
    Ok(())
}
