// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::account::Account;
use crate::modules::error::{MailSyncError, MailSyncResult};
use crate::modules::imap::pool::return_connection;
use crate::modules::imap::search::build_search_criteria;
use crate::modules::imap::types::{FetchProfile, ImapEnvelope, MessageFlags};
use crate::modules::imap::ImapConnection;
use crate::modules::store::folder::Folder;
use crate::modules::store::message::Message;
use crate::modules::sync::context::SyncContext;
use crate::modules::utils::compress_uid_list;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One search result. Local hits carry the enriched stored row (snippet
/// included); non-local hits carry envelope and flags only.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct SearchHit {
    pub uid: u32,
    pub is_local: bool,
    pub message: Option<Message>,
    pub envelope: Option<ImapEnvelope>,
    pub flags: MessageFlags,
    /// Epoch milliseconds used for the date-descending sort.
    pub date: i64,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub total_count: usize,
}

/// Server-side UID SEARCH over FROM/SUBJECT/TO/CC/BODY with local
/// enrichment: the newest `limit` UIDs are kept, locally stored matches
/// return their full rows, the rest get an envelope-only backfill, and
/// the merged list is sorted by date descending.
pub async fn imap_search(
    ctx: &SyncContext,
    account: &Account,
    folder: &Folder,
    query: &str,
    limit: usize,
    token: &CancellationToken,
) -> MailSyncResult<SearchResponse> {
    let mut conn = ctx.pool.get_connection(token, account.id).await?;
    let result = search_inner(ctx, account, folder, query, limit, conn.as_mut(), token).await;
    let suspect = result
        .as_ref()
        .err()
        .map(|e| e.is_connection_error())
        .unwrap_or(false);
    return_connection(ctx.pool.as_ref(), conn, suspect).await;
    result
}

async fn search_inner(
    ctx: &SyncContext,
    account: &Account,
    folder: &Folder,
    query: &str,
    limit: usize,
    conn: &mut dyn ImapConnection,
    token: &CancellationToken,
) -> MailSyncResult<SearchResponse> {
    conn.select_mailbox(&folder.path).await?;

    let criteria = build_search_criteria(query);
    let mut uids = conn.uid_search(&criteria).await?;
    let total_count = uids.len();
    debug!(
        "Account {}: search '{}' in '{}' matched {} UID(s)",
        account.id, query, folder.path, total_count
    );

    uids.sort_unstable_by(|a, b| b.cmp(a));
    if limit > 0 && uids.len() > limit {
        uids.truncate(limit);
    }

    let mut hits = Vec::with_capacity(uids.len());
    let mut missing = Vec::new();
    for &uid in &uids {
        match ctx.messages.get_by_uid(folder.id, uid).await? {
            Some(message) => {
                hits.push(SearchHit {
                    uid,
                    is_local: true,
                    flags: message.flags(),
                    date: if message.date != 0 {
                        message.date
                    } else {
                        message.received_at
                    },
                    message: Some(message),
                    envelope: None,
                });
            }
            None => missing.push(uid),
        }
    }

    if !missing.is_empty() {
        let uid_set = compress_uid_list(missing);
        let mut stream = conn.fetch(&uid_set, FetchProfile::Envelope).await?;
        loop {
            if token.is_cancelled() {
                let _ = stream.close().await;
                return Err(MailSyncError::cancelled());
            }
            let fetched = match stream.next().await? {
                Some(fetched) => fetched,
                None => break,
            };
            let date = fetched
                .envelope
                .as_ref()
                .map(|e| e.date)
                .filter(|d| *d != 0)
                .or(fetched.internal_date)
                .unwrap_or(0);
            hits.push(SearchHit {
                uid: fetched.uid,
                is_local: false,
                flags: fetched.message_flags(),
                date,
                message: None,
                envelope: fetched.envelope,
            });
        }
        let _ = stream.close().await;
    }

    hits.sort_by(|a, b| b.date.cmp(&a.date));

    Ok(SearchResponse {
        results: hits,
        total_count,
    })
}
