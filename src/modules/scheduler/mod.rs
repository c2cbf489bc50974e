// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::account::Account;
use crate::modules::error::{code::ErrorCode, MailSyncResult};
use crate::modules::hook::NewMailInfo;
use crate::modules::store::folder::FolderType;
use crate::modules::sync::context::SyncContext;
use crate::modules::sync::execute_account_sync;
use crate::{raise_error, utc_now};
use ahash::{AHashMap, AHashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const STARTUP_DELAY: Duration = Duration::from_secs(10);
const TICK_INTERVAL: Duration = Duration::from_secs(60);
const SYNC_DEADLINE: Duration = Duration::from_secs(30 * 60);

/// Optional connectivity predicate; when it returns false the whole tick
/// is skipped.
pub type ConnectivityCheck = Box<dyn Fn() -> bool + Send + Sync>;

#[derive(Default)]
struct SchedulerState {
    syncing: AHashSet<u64>,
    cancels: AHashMap<u64, CancellationToken>,
}

/// Per-account sync scheduler: a periodic loop deciding when each INBOX is
/// due, per-account serialization with cancellation, and the blocking and
/// fire-and-forget entry points.
pub struct SyncScheduler {
    ctx: SyncContext,
    // two registries under one mutex; holders never do I/O while locked
    state: Mutex<SchedulerState>,
    connectivity: Option<ConnectivityCheck>,
}

/// Handle for the periodic loop, in the shape of the usual cancellable
/// task handle.
pub struct SchedulerHandle {
    cancel_sender: Option<oneshot::Sender<()>>,
    join_handle: tokio::task::JoinHandle<()>,
}

impl SchedulerHandle {
    pub async fn stop(self) {
        if let Some(sender) = self.cancel_sender {
            let _ = sender.send(());
        }
        let _ = self.join_handle.await;
    }
}

impl SyncScheduler {
    pub fn new(ctx: SyncContext) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            state: Mutex::new(SchedulerState::default()),
            connectivity: None,
        })
    }

    pub fn with_connectivity(ctx: SyncContext, connectivity: ConnectivityCheck) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            state: Mutex::new(SchedulerState::default()),
            connectivity: Some(connectivity),
        })
    }

    /// Starts the periodic loop: a 10 second startup delay, then a tick
    /// every minute.
    pub fn start(self: &Arc<Self>) -> SchedulerHandle {
        let scheduler = self.clone();
        let (cancel_sender, mut cancel_receiver) = oneshot::channel::<()>();
        let join_handle = tokio::spawn(async move {
            info!("Sync scheduler started");
            tokio::select! {
                _ = tokio::time::sleep(STARTUP_DELAY) => {}
                _ = &mut cancel_receiver => {
                    info!("Sync scheduler stopped before first tick");
                    return;
                }
            }
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = scheduler.tick().await {
                            warn!("Scheduler tick failed: {:?}", e);
                        }
                    }
                    _ = &mut cancel_receiver => {
                        info!("Sync scheduler stopped");
                        break;
                    }
                }
            }
        });
        SchedulerHandle {
            cancel_sender: Some(cancel_sender),
            join_handle,
        }
    }

    async fn tick(self: &Arc<Self>) -> MailSyncResult<()> {
        if !self.is_online() {
            debug!("Offline, skipping scheduler tick");
            return Ok(());
        }
        let accounts = self.ctx.accounts.list().await?;
        for account in accounts {
            if !account.enabled || account.manual_only() {
                continue;
            }
            let due = match self
                .ctx
                .folders
                .get_by_type(account.id, FolderType::Inbox)
                .await?
            {
                Some(inbox) => {
                    utc_now!() - inbox.last_sync >= account.sync_interval_mins * 60_000
                }
                // never synced yet
                None => true,
            };
            if due {
                self.trigger_sync(account);
            }
        }
        Ok(())
    }

    fn is_online(&self) -> bool {
        self.connectivity.as_ref().map(|check| check()).unwrap_or(true)
    }

    /// Fire-and-forget sync of one account. A sync already in flight for
    /// the account makes this a silent no-op.
    pub fn trigger_sync(self: &Arc<Self>, account: Account) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            if let Err(e) = scheduler.run_sync(account).await {
                if e.is_cancelled() {
                    debug!("Sync cancelled: {e}");
                } else {
                    warn!("Sync failed: {e}");
                }
            }
        });
    }

    /// Fire-and-forget sync of every enabled account.
    pub fn trigger_sync_all(self: &Arc<Self>) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            match scheduler.ctx.accounts.list().await {
                Ok(accounts) => {
                    for account in accounts.into_iter().filter(|a| a.enabled) {
                        scheduler.trigger_sync(account);
                    }
                }
                Err(e) => warn!("Failed to list accounts for sync-all: {e}"),
            }
        });
    }

    /// Blocking sync of one account's INBOX, returning the new-mail delta.
    /// Used by IDLE-triggered refreshes. Returns `None` when a sync was
    /// already in flight or no new mail arrived.
    pub async fn sync_account_inbox_blocking(
        self: &Arc<Self>,
        account: Account,
    ) -> MailSyncResult<Option<NewMailInfo>> {
        self.clone().run_sync(account).await
    }

    /// Fires the cancel token of the account's in-flight sync, if any.
    pub fn cancel_sync(&self, account_id: u64) {
        let token = {
            let state = self.state.lock().expect("scheduler mutex poisoned");
            state.cancels.get(&account_id).cloned()
        };
        if let Some(token) = token {
            info!("Account {}: cancelling in-flight sync", account_id);
            token.cancel();
        }
    }

    async fn run_sync(self: Arc<Self>, account: Account) -> MailSyncResult<Option<NewMailInfo>> {
        let account_id = account.id;
        let token = {
            let mut state = self.state.lock().expect("scheduler mutex poisoned");
            if state.syncing.contains(&account_id) {
                debug!("Account {}: sync already in flight, skipping", account_id);
                return Ok(None);
            }
            state.syncing.insert(account_id);
            let token = CancellationToken::new();
            state.cancels.insert(account_id, token.clone());
            token
        };

        let started = utc_now!();
        let outcome = match tokio::time::timeout(
            SYNC_DEADLINE,
            execute_account_sync(&self.ctx, &account, &token),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                token.cancel();
                Err(raise_error!(
                    format!(
                        "Account {}: sync exceeded the {} minute deadline",
                        account_id,
                        SYNC_DEADLINE.as_secs() / 60
                    ),
                    ErrorCode::RequestTimeout
                ))
            }
        };

        {
            let mut state = self.state.lock().expect("scheduler mutex poisoned");
            state.syncing.remove(&account_id);
            state.cancels.remove(&account_id);
        }

        let (folder_id, new_mail) = match &outcome {
            Ok((folder_id, new_mail)) => (*folder_id, new_mail.clone()),
            Err(_) => {
                let folder_id = self
                    .ctx
                    .folders
                    .get_by_type(account_id, FolderType::Inbox)
                    .await
                    .ok()
                    .flatten()
                    .map(|f| f.id)
                    .unwrap_or(0);
                (folder_id, None)
            }
        };
        self.ctx
            .hook
            .on_sync_completed(account_id, folder_id, outcome.as_ref().err());

        match outcome {
            Ok(_) => {
                debug!(
                    "Account {}: sync completed in {} ms",
                    account_id,
                    utc_now!() - started
                );
                Ok(new_mail)
            }
            Err(e) => Err(e),
        }
    }
}
