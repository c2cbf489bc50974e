// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum ErrorCode {
    // Client-side errors (10000–10999)
    InvalidParameter = 10000,
    ExceedsLimitation = 10040,
    RequestTimeout = 10080,

    // Resource errors (30000–30999)
    ResourceNotFound = 30000,

    // Network connection errors (40000–40999)
    NetworkError = 40000,
    ConnectionTimeout = 40010,
    ConnectionPoolTimeout = 40020,

    // Mail service errors (50000–50999)
    ImapCommandFailed = 50000,
    ImapUnexpectedResult = 50020,
    MessageParseFailed = 50030,

    // Local store errors (60000–60999)
    StoreFailure = 60000,

    // Internal system errors (70000–70999)
    InternalError = 70000,
    Cancelled = 70020,
}

impl ErrorCode {
    /// True for errors that indicate the IMAP connection itself is suspect
    /// and a discard + re-acquire + retry is the right recovery.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ErrorCode::NetworkError
                | ErrorCode::ConnectionTimeout
                | ErrorCode::ConnectionPoolTimeout
        )
    }
}
