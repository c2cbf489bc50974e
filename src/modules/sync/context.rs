use crate::modules::account::AccountStore;
use crate::modules::hook::{SyncHook, SyncPhase, SyncProgress};
use crate::modules::imap::ConnectionPool;
use crate::modules::mime::BodyParser;
use crate::modules::security::HtmlSanitizer;
use crate::modules::store::attachment::AttachmentStore;
use crate::modules::store::folder::FolderStore;
use crate::modules::store::message::MessageStore;
use std::sync::Arc;

/// Everything the sync components need, bundled once by the host. Cheap to
/// clone; all fields are shared handles.
#[derive(Clone)]
pub struct SyncContext {
    pub pool: Arc<dyn ConnectionPool>,
    pub accounts: Arc<dyn AccountStore>,
    pub folders: Arc<dyn FolderStore>,
    pub messages: Arc<dyn MessageStore>,
    pub attachments: Arc<dyn AttachmentStore>,
    pub sanitizer: Arc<dyn HtmlSanitizer>,
    pub parser: BodyParser,
    pub hook: Arc<dyn SyncHook>,
}

impl SyncContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: Arc<dyn ConnectionPool>,
        accounts: Arc<dyn AccountStore>,
        folders: Arc<dyn FolderStore>,
        messages: Arc<dyn MessageStore>,
        attachments: Arc<dyn AttachmentStore>,
        sanitizer: Arc<dyn HtmlSanitizer>,
        parser: BodyParser,
        hook: Arc<dyn SyncHook>,
    ) -> Self {
        Self {
            pool,
            accounts,
            folders,
            messages,
            attachments,
            sanitizer,
            parser,
            hook,
        }
    }

    pub(crate) fn emit_progress(
        &self,
        account_id: u64,
        folder_id: u64,
        fetched: u64,
        total: u64,
        phase: SyncPhase,
    ) {
        self.hook.on_progress(SyncProgress {
            account_id,
            folder_id,
            fetched,
            total,
            phase,
        });
    }
}
