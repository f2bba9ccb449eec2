//! Authenticated request layer for the file-storage service.
//!
//! This module provides the `ApiClient` dispatcher, the `Transport` seam it
//! sends requests through, and a bounded retry wrapper.
//!
//! Protected endpoints use JWT bearer authentication. Access tokens are
//! renewed through the refresh endpoint before they expire.

pub mod client;
pub mod error;
pub mod retry;
pub mod transport;

pub use client::{
    ApiClient, FILES_PATH, LOGIN_PATH, LOGOUT_PATH, REFRESH_PATH, REGISTER_PATH, UPLOAD_PATH,
    VERIFY_PATH,
};
pub use error::ApiError;
pub use retry::RetryPolicy;
pub use transport::{ApiRequest, ApiResponse, FormPart, RequestBody, ReqwestTransport, Transport};
