// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

pub mod account;
pub mod error;
pub mod hook;
pub mod imap;
pub mod logger;
pub mod message;
pub mod mime;
pub mod scheduler;
pub mod security;
pub mod store;
pub mod sync;
pub mod utils;
