// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::account::Account;
use crate::modules::error::MailSyncResult;
use crate::modules::hook::NewMailInfo;
use crate::modules::store::folder::FolderType;
use crate::raise_error;
use context::SyncContext;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub mod bodies;
pub mod context;
pub mod folders;
pub mod messages;
pub mod threads;
#[cfg(test)]
pub mod testkit;

/// One full sync pass for an account: reconcile folders, then the INBOX
/// message set, then missing bodies. Returns the INBOX folder id and, when
/// the total grew, the new-mail delta (also delivered through the hook).
pub async fn execute_account_sync(
    ctx: &SyncContext,
    account: &Account,
    token: &CancellationToken,
) -> MailSyncResult<(u64, Option<NewMailInfo>)> {
    folders::sync_folders(ctx, account, token).await?;

    let inbox = ctx
        .folders
        .get_by_type(account.id, FolderType::Inbox)
        .await?
        .ok_or_else(|| {
            raise_error!(
                format!("Account {}: no INBOX folder after folder sync", account.id),
                crate::modules::error::code::ErrorCode::ResourceNotFound
            )
        })?;
    let previous_count = inbox.total_count;

    messages::sync_messages(ctx, account, &inbox, token).await?;

    let inbox = ctx.folders.get(inbox.id).await?.ok_or_else(|| {
        raise_error!(
            format!("Account {}: INBOX disappeared during sync", account.id),
            crate::modules::error::code::ErrorCode::ResourceNotFound
        )
    })?;

    let new_mail = if inbox.total_count > previous_count {
        let info = NewMailInfo {
            account_id: account.id,
            account_name: account.display_name.clone(),
            folder_id: inbox.id,
            count: inbox.total_count - previous_count,
        };
        info!(
            "Account {}: {} new message(s) in INBOX",
            account.id, info.count
        );
        ctx.hook.on_new_mail(info.clone());
        Some(info)
    } else {
        None
    };

    bodies::fetch_missing_bodies(ctx, account, &inbox, token).await?;

    Ok((inbox.id, new_mail))
}
