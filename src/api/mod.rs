//! Remote session API integration.
//!
//! The booth uploads each normalized photo to a session on the backend,
//! which runs the AI transformation. This module holds the HTTP client, the
//! retry helpers for reads, and the explicitly passed session context.

mod client;
mod retry;
mod session;

pub use client::{
    extract_error_message, ApiError, Session, SessionApi, SessionClient, Theme, API_KEY_ENV,
    DEFAULT_API_BASE_URL, DEFAULT_TIMEOUT, DEFAULT_UPLOAD_TIMEOUT,
};
pub use retry::{calculate_backoff, is_transient, with_network_retry, RetryPolicy};
pub use session::{SessionContext, SessionProvider};
