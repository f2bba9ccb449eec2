//! signbox-core - authenticated client for a signing file-storage service.
//!
//! The request layer attaches credentials to every protected call, renews
//! the access token before it lapses, ends the session on a 401, and turns
//! signature-verification results into verdicts.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod utils;
pub mod verify;

#[cfg(test)]
mod testutil;

pub use api::{ApiClient, ApiError, ApiRequest, ApiResponse, RetryPolicy};
pub use auth::{CredentialPair, CredentialStore, SessionNotifier, SessionState};
pub use config::Config;
pub use verify::{Verdict, VerdictKind};
