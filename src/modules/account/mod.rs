// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::MailSyncResult;
use crate::modules::store::folder::FolderType;
use crate::utc_now;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Maps a well-known folder type to a server path chosen by the user.
/// Overrides beat the server's special-use attributes.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct FolderOverride {
    pub folder_type: FolderType,
    pub path: String,
}

/// Account configuration. Created and mutated outside the core; the core
/// only reads it.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct Account {
    pub id: u64,
    pub display_name: String,
    pub email: String,
    pub enabled: bool,
    /// Minutes between scheduled syncs; 0 means manual only.
    pub sync_interval_mins: i64,
    /// Days of history to keep in sync; 0 means unlimited.
    pub sync_window_days: i64,
    pub folder_overrides: Vec<FolderOverride>,
}

impl Account {
    pub fn manual_only(&self) -> bool {
        self.sync_interval_mins <= 0
    }

    /// Epoch-millisecond cutoff for the configured sync window, if any.
    pub fn window_cutoff(&self) -> Option<i64> {
        if self.sync_window_days > 0 {
            Some(crate::after_n_days_timestamp!(
                utc_now!(),
                -self.sync_window_days
            ))
        } else {
            None
        }
    }

    pub fn override_for(&self, path: &str) -> Option<FolderType> {
        self.folder_overrides
            .iter()
            .find(|o| o.path == path)
            .map(|o| o.folder_type)
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn list(&self) -> MailSyncResult<Vec<Account>>;
    async fn get(&self, id: u64) -> MailSyncResult<Option<Account>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_cutoff_is_in_the_past() {
        let account = Account {
            sync_window_days: 30,
            ..Default::default()
        };
        let cutoff = account.window_cutoff().unwrap();
        assert!(cutoff < utc_now!());

        let unlimited = Account::default();
        assert!(unlimited.window_cutoff().is_none());
    }
}
