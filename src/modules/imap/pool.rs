use crate::modules::error::MailSyncResult;
use crate::modules::imap::ImapConnection;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Shared connection pool, supplied by the transport layer.
///
/// Borrow and [`release`](ConnectionPool::release) are always paired; on a
/// suspected connection error the holder calls
/// [`discard`](ConnectionPool::discard) instead and borrows a fresh one.
/// A connection is never used by two tasks at once.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    /// May block until a connection is available or the token fires.
    async fn get_connection(
        &self,
        token: &CancellationToken,
        account_id: u64,
    ) -> MailSyncResult<Box<dyn ImapConnection>>;
    async fn release(&self, conn: Box<dyn ImapConnection>);
    async fn discard(&self, conn: Box<dyn ImapConnection>);
}

/// Returns a borrowed connection, discarding it when the last error on it
/// was a connection error.
pub async fn return_connection(
    pool: &dyn ConnectionPool,
    conn: Box<dyn ImapConnection>,
    suspect: bool,
) {
    if suspect {
        pool.discard(conn).await;
    } else {
        pool.release(conn).await;
    }
}
