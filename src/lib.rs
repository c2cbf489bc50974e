pub mod modules;

pub use modules::account::{Account, AccountStore, FolderOverride};
pub use modules::error::{code::ErrorCode, MailSyncError, MailSyncResult};
pub use modules::hook::{NewMailInfo, SyncHook, SyncPhase, SyncProgress};
pub use modules::imap::{ConnectionPool, FetchStream, ImapConnection};
pub use modules::mime::{BodyParser, ParsedBody};
pub use modules::scheduler::SyncScheduler;
pub use modules::security::{HtmlSanitizer, PgpVerifier, SmimeVerifier};
pub use modules::store::{
    attachment::{Attachment, AttachmentStore},
    folder::{Folder, FolderStore, FolderType},
    message::{Message, MessageStore},
};
pub use modules::message::fetch::{fetch_message_body, fetch_raw_message, fetch_server_message};
pub use modules::message::search::{imap_search, SearchHit, SearchResponse};
pub use modules::sync::context::SyncContext;
pub use modules::sync::execute_account_sync;
