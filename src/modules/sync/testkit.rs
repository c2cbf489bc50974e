// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! In-memory stores and a scriptable IMAP server for the sync test suites.

use crate::modules::account::{Account, AccountStore};
use crate::modules::error::{code::ErrorCode, MailSyncResult};
use crate::modules::hook::{NewMailInfo, SyncHook, SyncProgress};
use crate::modules::imap::types::{
    FetchProfile, FetchedMessage, ImapEnvelope, MailboxStatus, MessageFlags, RemoteMailbox,
    SelectedMailbox,
};
use crate::modules::imap::{ConnectionPool, FetchStream, ImapConnection};
use crate::modules::mime::BodyParser;
use crate::modules::security::{HtmlSanitizer, NoopSanitizer};
use crate::modules::store::attachment::{Attachment, AttachmentStore};
use crate::modules::store::folder::{Folder, FolderStore, FolderType};
use crate::modules::store::message::{BodyUpdate, Message, MessageStore};
use crate::modules::sync::context::SyncContext;
use crate::raise_error;
use ahash::AHashMap;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// stores

#[derive(Default)]
pub struct MemoryAccountStore {
    pub accounts: Mutex<Vec<Account>>,
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn list(&self) -> MailSyncResult<Vec<Account>> {
        Ok(self.accounts.lock().unwrap().clone())
    }

    async fn get(&self, id: u64) -> MailSyncResult<Option<Account>> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }
}

#[derive(Default)]
struct FolderTable {
    rows: BTreeMap<u64, Folder>,
    next_id: u64,
}

#[derive(Default)]
pub struct MemoryFolderStore {
    inner: Mutex<FolderTable>,
}

impl MemoryFolderStore {
    pub fn all(&self) -> Vec<Folder> {
        self.inner.lock().unwrap().rows.values().cloned().collect()
    }
}

#[async_trait]
impl FolderStore for MemoryFolderStore {
    async fn list(&self, account_id: u64) -> MailSyncResult<Vec<Folder>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .rows
            .values()
            .filter(|f| f.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn get(&self, id: u64) -> MailSyncResult<Option<Folder>> {
        Ok(self.inner.lock().unwrap().rows.get(&id).cloned())
    }

    async fn get_by_type(
        &self,
        account_id: u64,
        folder_type: FolderType,
    ) -> MailSyncResult<Option<Folder>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .rows
            .values()
            .find(|f| f.account_id == account_id && f.folder_type == folder_type)
            .cloned())
    }

    async fn create(&self, folder: &Folder) -> MailSyncResult<u64> {
        let mut table = self.inner.lock().unwrap();
        assert!(
            !table
                .rows
                .values()
                .any(|f| f.account_id == folder.account_id && f.path == folder.path),
            "(account_id, path) must be unique: {}",
            folder.path
        );
        table.next_id += 1;
        let id = table.next_id;
        let mut folder = folder.clone();
        folder.id = id;
        table.rows.insert(id, folder);
        Ok(id)
    }

    async fn update(&self, folder: &Folder) -> MailSyncResult<()> {
        let mut table = self.inner.lock().unwrap();
        table
            .rows
            .insert(folder.id, folder.clone())
            .ok_or_else(|| {
                raise_error!(
                    format!("folder {} does not exist", folder.id),
                    ErrorCode::StoreFailure
                )
            })?;
        Ok(())
    }

    async fn delete(&self, id: u64) -> MailSyncResult<()> {
        self.inner.lock().unwrap().rows.remove(&id);
        Ok(())
    }
}

#[derive(Default)]
struct MessageTable {
    rows: BTreeMap<u64, Message>,
    next_id: u64,
    creates: u64,
}

#[derive(Default)]
pub struct MemoryMessageStore {
    inner: Mutex<MessageTable>,
}

impl MemoryMessageStore {
    pub fn all(&self) -> Vec<Message> {
        self.inner.lock().unwrap().rows.values().cloned().collect()
    }

    /// Number of `create` calls, for the idempotence law.
    pub fn create_count(&self) -> u64 {
        self.inner.lock().unwrap().creates
    }

    pub fn insert_raw(&self, message: Message) -> u64 {
        let mut table = self.inner.lock().unwrap();
        table.next_id += 1;
        let id = table.next_id;
        let mut message = message;
        message.id = id;
        table.rows.insert(id, message);
        id
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn create(&self, message: &Message) -> MailSyncResult<u64> {
        assert!(message.uid > 0, "uid must be positive");
        let mut table = self.inner.lock().unwrap();
        assert!(
            !table
                .rows
                .values()
                .any(|m| m.folder_id == message.folder_id && m.uid == message.uid),
            "(folder_id, uid) must be unique: folder {} uid {}",
            message.folder_id,
            message.uid
        );
        table.next_id += 1;
        table.creates += 1;
        let id = table.next_id;
        let mut message = message.clone();
        message.id = id;
        table.rows.insert(id, message);
        Ok(id)
    }

    async fn get(&self, id: u64) -> MailSyncResult<Option<Message>> {
        Ok(self.inner.lock().unwrap().rows.get(&id).cloned())
    }

    async fn get_by_uid(&self, folder_id: u64, uid: u32) -> MailSyncResult<Option<Message>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .rows
            .values()
            .find(|m| m.folder_id == folder_id && m.uid == uid)
            .cloned())
    }

    async fn get_all_uids(&self, folder_id: u64) -> MailSyncResult<Vec<u32>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .rows
            .values()
            .filter(|m| m.folder_id == folder_id)
            .map(|m| m.uid)
            .collect())
    }

    async fn get_message_uid_and_folder(&self, id: u64) -> MailSyncResult<Option<(u32, u64)>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .rows
            .get(&id)
            .map(|m| (m.uid, m.folder_id)))
    }

    async fn get_message_uids_and_folder(
        &self,
        ids: &[u64],
    ) -> MailSyncResult<AHashMap<u64, (u32, u64)>> {
        let table = self.inner.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| table.rows.get(id).map(|m| (*id, (m.uid, m.folder_id))))
            .collect())
    }

    async fn count_messages_without_body(
        &self,
        folder_id: u64,
        since: Option<i64>,
    ) -> MailSyncResult<u64> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .rows
            .values()
            .filter(|m| {
                m.folder_id == folder_id
                    && !m.body_fetched
                    && since.map(|cutoff| m.received_at >= cutoff).unwrap_or(true)
            })
            .count() as u64)
    }

    async fn get_messages_without_body_and_size(
        &self,
        folder_id: u64,
        limit: usize,
        since: Option<i64>,
    ) -> MailSyncResult<Vec<(u64, u32)>> {
        let table = self.inner.lock().unwrap();
        let mut rows: Vec<&Message> = table
            .rows
            .values()
            .filter(|m| {
                m.folder_id == folder_id
                    && !m.body_fetched
                    && since.map(|cutoff| m.received_at >= cutoff).unwrap_or(true)
            })
            .collect();
        rows.sort_by_key(|m| m.received_at);
        Ok(rows.into_iter().take(limit).map(|m| (m.id, m.size)).collect())
    }

    async fn count_unread_by_folder(&self, folder_id: u64) -> MailSyncResult<u32> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .rows
            .values()
            .filter(|m| m.folder_id == folder_id && !m.is_read)
            .count() as u32)
    }

    async fn update_body(&self, update: &BodyUpdate) -> MailSyncResult<()> {
        self.update_bodies_batch(std::slice::from_ref(update)).await
    }

    async fn update_bodies_batch(&self, updates: &[BodyUpdate]) -> MailSyncResult<()> {
        let mut table = self.inner.lock().unwrap();
        for update in updates {
            let row = table.rows.get_mut(&update.message_id).ok_or_else(|| {
                raise_error!(
                    format!("message {} does not exist", update.message_id),
                    ErrorCode::StoreFailure
                )
            })?;
            row.body_text = update.body_text.clone();
            row.body_html = update.body_html.clone();
            row.snippet = update.snippet.clone();
            row.has_attachments = update.has_attachments;
            row.smime_raw_body = update.smime_raw_body.clone();
            row.smime_encrypted = update.smime_encrypted;
            row.pgp_raw_body = update.pgp_raw_body.clone();
            row.pgp_encrypted = update.pgp_encrypted;
            // empty updates stay re-fetchable across sessions
            row.body_fetched = !update.is_empty();
        }
        Ok(())
    }

    async fn update_flags_by_uid_batch(
        &self,
        folder_id: u64,
        flags: &[(u32, MessageFlags)],
    ) -> MailSyncResult<()> {
        let mut table = self.inner.lock().unwrap();
        let flag_map: AHashMap<u32, MessageFlags> = flags.iter().copied().collect();
        for row in table.rows.values_mut() {
            if row.folder_id == folder_id {
                if let Some(f) = flag_map.get(&row.uid) {
                    row.apply_flags(f);
                }
            }
        }
        Ok(())
    }

    async fn update_thread_id(&self, id: u64, thread_id: &str) -> MailSyncResult<()> {
        if let Some(row) = self.inner.lock().unwrap().rows.get_mut(&id) {
            row.thread_id = thread_id.to_string();
        }
        Ok(())
    }

    async fn find_thread_id(
        &self,
        account_id: u64,
        message_id: &str,
        in_reply_to: &str,
        references: &[String],
    ) -> MailSyncResult<Option<String>> {
        let table = self.inner.lock().unwrap();
        let mut wanted: Vec<&str> = Vec::new();
        for key in std::iter::once(message_id)
            .chain(std::iter::once(in_reply_to))
            .chain(references.iter().map(String::as_str))
        {
            if !key.is_empty() {
                wanted.push(key);
            }
        }
        for row in table.rows.values() {
            if row.account_id != account_id || row.thread_id.is_empty() {
                continue;
            }
            let row_refs = row.references_list();
            let hit = wanted.iter().any(|key| {
                row.message_id == *key
                    || row.in_reply_to == *key
                    || row_refs.iter().any(|r| r == key)
            }) || (!message_id.is_empty()
                && (row.in_reply_to == message_id
                    || row_refs.iter().any(|r| r == message_id)));
            if hit {
                return Ok(Some(row.thread_id.clone()));
            }
        }
        Ok(None)
    }

    async fn reconcile_threads_for_new_message(
        &self,
        account_id: u64,
        message_id: &str,
    ) -> MailSyncResult<()> {
        let mut table = self.inner.lock().unwrap();
        let Some(owner) = table
            .rows
            .values()
            .find(|m| m.account_id == account_id && m.message_id == message_id)
            .cloned()
        else {
            return Ok(());
        };
        // gather everything linked to this message-id and settle on the
        // thread of the earliest-received member
        let related: Vec<u64> = table
            .rows
            .values()
            .filter(|m| {
                m.account_id == account_id
                    && (m.id == owner.id
                        || m.in_reply_to == message_id
                        || m.references_list().iter().any(|r| r == message_id)
                        || (!owner.in_reply_to.is_empty() && m.message_id == owner.in_reply_to)
                        || owner.references_list().iter().any(|r| *r == m.message_id))
            })
            .map(|m| m.id)
            .collect();
        if related.len() < 2 {
            return Ok(());
        }
        let thread_id = related
            .iter()
            .filter_map(|id| table.rows.get(id))
            .min_by_key(|m| m.received_at)
            .map(|m| m.thread_id.clone())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| owner.thread_id.clone());
        for id in related {
            if let Some(row) = table.rows.get_mut(&id) {
                row.thread_id = thread_id.clone();
            }
        }
        Ok(())
    }

    async fn delete_by_uid(&self, folder_id: u64, uids: &[u32]) -> MailSyncResult<()> {
        let mut table = self.inner.lock().unwrap();
        table
            .rows
            .retain(|_, m| m.folder_id != folder_id || !uids.contains(&m.uid));
        Ok(())
    }

    async fn delete_by_folder(&self, folder_id: u64) -> MailSyncResult<()> {
        self.inner
            .lock()
            .unwrap()
            .rows
            .retain(|_, m| m.folder_id != folder_id);
        Ok(())
    }

    async fn delete_older_than(&self, folder_id: u64, cutoff: i64) -> MailSyncResult<u64> {
        let mut table = self.inner.lock().unwrap();
        let before = table.rows.len();
        table
            .rows
            .retain(|_, m| m.folder_id != folder_id || m.received_at >= cutoff);
        Ok((before - table.rows.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemoryAttachmentStore {
    pub rows: Mutex<Vec<Attachment>>,
}

#[async_trait]
impl AttachmentStore for MemoryAttachmentStore {
    async fn create(&self, attachment: &Attachment) -> MailSyncResult<u64> {
        let mut rows = self.rows.lock().unwrap();
        let id = rows.len() as u64 + 1;
        let mut attachment = attachment.clone();
        attachment.id = id;
        rows.push(attachment);
        Ok(id)
    }

    async fn create_batch(&self, attachments: &[Attachment]) -> MailSyncResult<()> {
        for attachment in attachments {
            self.create(attachment).await?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// hooks

#[derive(Default)]
pub struct RecordingHook {
    pub progress: Mutex<Vec<SyncProgress>>,
    pub new_mail: Mutex<Vec<NewMailInfo>>,
    pub completed: Mutex<Vec<(u64, u64, bool)>>,
}

impl SyncHook for RecordingHook {
    fn on_progress(&self, progress: SyncProgress) {
        self.progress.lock().unwrap().push(progress);
    }

    fn on_new_mail(&self, info: NewMailInfo) {
        self.new_mail.lock().unwrap().push(info);
    }

    fn on_sync_completed(
        &self,
        account_id: u64,
        folder_id: u64,
        error: Option<&crate::modules::error::MailSyncError>,
    ) {
        self.completed
            .lock()
            .unwrap()
            .push((account_id, folder_id, error.is_some()));
    }
}

// ---------------------------------------------------------------------------
// scripted IMAP server

#[derive(Clone, Default)]
pub struct ServerFolder {
    pub status: MailboxStatus,
    pub uids: Vec<u32>,
    pub flags: AHashMap<u32, Vec<String>>,
    pub messages: AHashMap<u32, Vec<u8>>,
    pub internal_dates: AHashMap<u32, i64>,
    pub envelopes: AHashMap<u32, ImapEnvelope>,
    /// Returned for free-text (OR ...) searches.
    pub search_matches: Vec<u32>,
    /// Returned for SINCE searches; `uids` answers ALL.
    pub since_matches: Option<Vec<u32>>,
}

#[derive(Default)]
pub struct ServerState {
    pub mailboxes: Vec<RemoteMailbox>,
    pub folders: BTreeMap<String, ServerFolder>,
    pub fail_list: bool,
    pub fail_status_paths: Vec<String>,
    /// Each FETCH consumes one while non-zero: simulated transient
    /// connection failures.
    pub fail_next_fetches: u32,
    /// Non-connection FETCH failures.
    pub fail_next_fetches_permanent: u32,
    pub selects: u32,
    pub fetches: u32,
    /// Sleep inserted into SELECT so tests can interleave tasks.
    pub select_delay_ms: u64,
    /// Fire the token after streaming this many messages of a FETCH.
    pub cancel_fetch_after: Option<(u32, CancellationToken)>,
}

pub struct MockPool {
    pub state: Arc<Mutex<ServerState>>,
    pub borrowed: AtomicU32,
    pub released: AtomicU32,
    pub discarded: AtomicU32,
}

impl MockPool {
    pub fn new(state: ServerState) -> Arc<Self> {
        Arc::new(Self {
            state: Arc::new(Mutex::new(state)),
            borrowed: AtomicU32::new(0),
            released: AtomicU32::new(0),
            discarded: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl ConnectionPool for MockPool {
    async fn get_connection(
        &self,
        _token: &CancellationToken,
        _account_id: u64,
    ) -> MailSyncResult<Box<dyn ImapConnection>> {
        self.borrowed.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            state: self.state.clone(),
            selected: None,
        }))
    }

    async fn release(&self, _conn: Box<dyn ImapConnection>) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }

    async fn discard(&self, _conn: Box<dyn ImapConnection>) {
        self.discarded.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct MockConnection {
    state: Arc<Mutex<ServerState>>,
    selected: Option<String>,
}

#[async_trait]
impl ImapConnection for MockConnection {
    async fn list_mailboxes(&mut self) -> MailSyncResult<Vec<RemoteMailbox>> {
        let state = self.state.lock().unwrap();
        if state.fail_list {
            return Err(raise_error!(
                "LIST failed".into(),
                ErrorCode::ImapCommandFailed
            ));
        }
        Ok(state.mailboxes.clone())
    }

    async fn mailbox_status(&mut self, path: &str) -> MailSyncResult<MailboxStatus> {
        let state = self.state.lock().unwrap();
        if state.fail_status_paths.iter().any(|p| p == path) {
            return Err(raise_error!(
                format!("STATUS failed for {path}"),
                ErrorCode::ImapCommandFailed
            ));
        }
        state
            .folders
            .get(path)
            .map(|f| f.status)
            .ok_or_else(|| raise_error!(format!("no mailbox {path}"), ErrorCode::ResourceNotFound))
    }

    async fn select_mailbox(&mut self, path: &str) -> MailSyncResult<SelectedMailbox> {
        let (selected, delay) = {
            let mut state = self.state.lock().unwrap();
            state.selects += 1;
            let folder = state.folders.get(path).ok_or_else(|| {
                raise_error!(format!("no mailbox {path}"), ErrorCode::ResourceNotFound)
            })?;
            (
                SelectedMailbox {
                    uid_validity: folder.status.uid_validity,
                    uid_next: folder.status.uid_next,
                    highest_modseq: folder.status.highest_modseq,
                    exists: folder.status.messages,
                },
                state.select_delay_ms,
            )
        };
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        self.selected = Some(path.to_string());
        Ok(selected)
    }

    async fn uid_search(&mut self, criteria: &str) -> MailSyncResult<Vec<u32>> {
        let state = self.state.lock().unwrap();
        let folder = self.selected_folder(&state)?;
        if criteria.starts_with("OR ") {
            return Ok(folder.search_matches.clone());
        }
        if criteria.starts_with("SINCE ") {
            return Ok(folder
                .since_matches
                .clone()
                .unwrap_or_else(|| folder.uids.clone()));
        }
        Ok(folder.uids.clone())
    }

    async fn fetch<'a>(
        &'a mut self,
        uid_set: &str,
        profile: FetchProfile,
    ) -> MailSyncResult<Box<dyn FetchStream + Send + 'a>> {
        let mut state = self.state.lock().unwrap();
        state.fetches += 1;
        if state.fail_next_fetches > 0 {
            state.fail_next_fetches -= 1;
            return Err(raise_error!(
                "connection reset during FETCH".into(),
                ErrorCode::NetworkError
            ));
        }
        if state.fail_next_fetches_permanent > 0 {
            state.fail_next_fetches_permanent -= 1;
            return Err(raise_error!(
                "server said BAD".into(),
                ErrorCode::ImapCommandFailed
            ));
        }
        let cancel_after = state.cancel_fetch_after.clone();
        let folder = self.selected_folder(&state)?.clone();
        drop(state);

        let mut items = Vec::new();
        for uid in expand_uid_set(uid_set) {
            if !folder.uids.contains(&uid) && !folder.messages.contains_key(&uid) {
                continue;
            }
            let raw = folder.messages.get(&uid).cloned();
            let flags = folder.flags.get(&uid).cloned().unwrap_or_default();
            let internal_date = folder.internal_dates.get(&uid).copied();
            let size = raw.as_ref().map(|r| r.len() as u32).unwrap_or(0);
            let fetched = match profile {
                FetchProfile::Flags => FetchedMessage {
                    uid,
                    flags,
                    ..Default::default()
                },
                FetchProfile::Headers => FetchedMessage {
                    uid,
                    flags,
                    size,
                    internal_date,
                    header: raw,
                    ..Default::default()
                },
                FetchProfile::Envelope => FetchedMessage {
                    uid,
                    flags,
                    size,
                    internal_date,
                    envelope: folder.envelopes.get(&uid).cloned(),
                    ..Default::default()
                },
                FetchProfile::Body => FetchedMessage {
                    uid,
                    flags,
                    size,
                    internal_date,
                    body: raw,
                    ..Default::default()
                },
            };
            items.push(fetched);
        }
        Ok(Box::new(MockFetchStream {
            items,
            pos: 0,
            cancel_after,
        }))
    }
}

impl MockConnection {
    fn selected_folder<'s>(
        &self,
        state: &'s ServerState,
    ) -> MailSyncResult<&'s ServerFolder> {
        let path = self.selected.as_deref().ok_or_else(|| {
            raise_error!("no mailbox selected".into(), ErrorCode::ImapCommandFailed)
        })?;
        state
            .folders
            .get(path)
            .ok_or_else(|| raise_error!(format!("no mailbox {path}"), ErrorCode::ResourceNotFound))
    }
}

pub struct MockFetchStream {
    items: Vec<FetchedMessage>,
    pos: usize,
    cancel_after: Option<(u32, CancellationToken)>,
}

#[async_trait]
impl FetchStream for MockFetchStream {
    async fn next(&mut self) -> MailSyncResult<Option<FetchedMessage>> {
        if self.pos >= self.items.len() {
            return Ok(None);
        }
        if let Some((after, token)) = &self.cancel_after {
            if self.pos == *after as usize {
                token.cancel();
            }
        }
        let item = self.items[self.pos].clone();
        self.pos += 1;
        Ok(Some(item))
    }

    async fn close(&mut self) -> MailSyncResult<()> {
        Ok(())
    }
}

/// Expands an IMAP sequence-set string ("1:3,7,9:10") back into UIDs.
pub fn expand_uid_set(uid_set: &str) -> Vec<u32> {
    let mut uids = Vec::new();
    for piece in uid_set.split(',') {
        match piece.split_once(':') {
            Some((start, end)) => {
                if let (Ok(start), Ok(end)) = (start.parse::<u32>(), end.parse::<u32>()) {
                    uids.extend(start..=end);
                }
            }
            None => {
                if let Ok(uid) = piece.parse::<u32>() {
                    uids.push(uid);
                }
            }
        }
    }
    uids
}

// ---------------------------------------------------------------------------
// context assembly

pub struct TestEnv {
    pub ctx: SyncContext,
    pub pool: Arc<MockPool>,
    pub accounts: Arc<MemoryAccountStore>,
    pub folders: Arc<MemoryFolderStore>,
    pub messages: Arc<MemoryMessageStore>,
    pub attachments: Arc<MemoryAttachmentStore>,
    pub hook: Arc<RecordingHook>,
}

pub fn test_env(state: ServerState) -> TestEnv {
    let pool = MockPool::new(state);
    let accounts = Arc::new(MemoryAccountStore::default());
    let folders = Arc::new(MemoryFolderStore::default());
    let messages = Arc::new(MemoryMessageStore::default());
    let attachments = Arc::new(MemoryAttachmentStore::default());
    let hook = Arc::new(RecordingHook::default());
    let sanitizer: Arc<dyn HtmlSanitizer> = Arc::new(NoopSanitizer);
    let ctx = SyncContext::new(
        pool.clone(),
        accounts.clone(),
        folders.clone(),
        messages.clone(),
        attachments.clone(),
        sanitizer,
        BodyParser::new(),
        hook.clone(),
    );
    TestEnv {
        ctx,
        pool,
        accounts,
        folders,
        messages,
        attachments,
        hook,
    }
}

pub fn test_account(id: u64) -> Account {
    Account {
        id,
        display_name: format!("Account {id}"),
        email: format!("user{id}@example.com"),
        enabled: true,
        sync_interval_mins: 15,
        sync_window_days: 0,
        folder_overrides: Vec::new(),
    }
}

/// A minimal but valid RFC 5322 message for fixtures.
pub fn raw_message(subject: &str, message_id: &str, in_reply_to: &str) -> Vec<u8> {
    let mut raw = String::new();
    raw.push_str("From: Alice Example <alice@example.com>\r\n");
    raw.push_str("To: Bob Example <bob@example.com>\r\n");
    raw.push_str(&format!("Subject: {subject}\r\n"));
    raw.push_str(&format!("Message-ID: {message_id}\r\n"));
    if !in_reply_to.is_empty() {
        raw.push_str(&format!("In-Reply-To: {in_reply_to}\r\n"));
        raw.push_str(&format!("References: {in_reply_to}\r\n"));
    }
    raw.push_str("Date: Mon, 14 Jul 2025 10:00:00 +0000\r\n");
    raw.push_str("Content-Type: text/plain; charset=utf-8\r\n");
    raw.push_str("\r\n");
    raw.push_str(&format!("Body of {subject}.\r\n"));
    raw.into_bytes()
}

pub fn simple_inbox_server(uids: &[u32], uid_validity: u32) -> ServerState {
    let mut folder = ServerFolder {
        status: MailboxStatus {
            uid_validity,
            uid_next: uids.iter().max().copied().unwrap_or(0) + 1,
            highest_modseq: 1,
            messages: uids.len() as u32,
            unseen: Some(uids.len() as u32),
        },
        uids: uids.to_vec(),
        ..Default::default()
    };
    for &uid in uids {
        folder.flags.insert(uid, vec![]);
        folder
            .messages
            .insert(uid, raw_message(&format!("msg {uid}"), &format!("<m{uid}@x>"), ""));
        folder.internal_dates.insert(uid, 1_752_000_000_000 + uid as i64);
    }
    let mut state = ServerState::default();
    state.mailboxes = vec![RemoteMailbox {
        path: "INBOX".into(),
        delimiter: Some("/".into()),
        special_use: None,
        no_select: false,
    }];
    state.folders.insert("INBOX".into(), folder);
    state
}
