use std::time::Duration;

use reqwest::StatusCode;
use tracing::warn;

use super::transport::{ApiRequest, ApiResponse};
use super::{ApiClient, ApiError};

/// Maximum number of retries for rate-limited (429) or failed requests.
/// 3 retries with exponential backoff usually succeeds without excessive delay.
const MAX_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Bounded retry around the dispatcher. Only 429 responses and failures
/// that never produced a response are retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
        }
    }

    fn should_retry(result: &Result<ApiResponse, ApiError>) -> bool {
        match result {
            Ok(response) => response.status == StatusCode::TOO_MANY_REQUESTS,
            Err(e) => e.is_retryable(),
        }
    }
}

impl ApiClient {
    /// `dispatch` with exponential backoff. Each attempt goes through the
    /// full refresh/401 handling, so a retry after a forced logout is sent
    /// without a credential.
    pub async fn dispatch_with_retry(
        &self,
        request: ApiRequest,
        policy: &RetryPolicy,
    ) -> Result<ApiResponse, ApiError> {
        let mut retries = 0;
        let mut backoff = policy.initial_backoff;

        loop {
            let result = self.dispatch(request.clone()).await;
            if !RetryPolicy::should_retry(&result) || retries >= policy.max_retries {
                return result;
            }

            retries += 1;
            warn!(
                path = %request.path,
                retry = retries,
                backoff_ms = backoff.as_millis() as u64,
                "Request failed, backing off"
            );
            tokio::time::sleep(backoff).await;
            backoff *= 2; // Exponential backoff
        }
    }
}
