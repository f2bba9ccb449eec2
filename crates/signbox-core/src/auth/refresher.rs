use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::claims::{decode_expiry, ClaimError};
use super::store::expiry_after;
use super::{CredentialPair, CredentialStore, SessionNotifier, SessionState};
use crate::api::{ApiError, ApiRequest, Transport};
use crate::models::{RefreshRequest, RefreshResponse};

/// What `ensure_fresh` did. Purely informational; failures are already
/// handled by the time this is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Access token has at least the threshold left.
    Fresh,
    /// A new access token was stored.
    Refreshed,
    /// Nothing to refresh: the store is empty.
    NoCredentials,
    /// Access token is near expiry but the refresh token is missing or expired.
    RefreshUnavailable,
    /// The refresh exchange failed and the session was ended.
    Failed,
}

/// Time the access token has left, taking the earlier of the stored expiry
/// and the JWT `exp` claim. A JWT that cannot be decoded counts as expired.
pub fn access_time_left(pair: &CredentialPair, now: DateTime<Utc>) -> Duration {
    let expires_at = match decode_expiry(&pair.access_token) {
        Ok(claimed) => claimed.min(pair.access_expires_at),
        Err(ClaimError::NotJwt) => pair.access_expires_at,
        Err(ClaimError::Malformed(reason)) => {
            debug!(%reason, "Access token claims unreadable, treating as expired");
            return Duration::zero();
        }
    };
    expires_at - now
}

/// Proactively renews the access token before it lapses.
///
/// Concurrent callers may both decide to refresh; each exchange overwrites
/// the access half of the store and the last successful one wins.
#[derive(Clone)]
pub struct Refresher {
    store: Arc<CredentialStore>,
    session: SessionNotifier,
    transport: Arc<dyn Transport>,
    refresh_path: String,
    threshold: Duration,
}

impl Refresher {
    pub fn new(
        store: Arc<CredentialStore>,
        session: SessionNotifier,
        transport: Arc<dyn Transport>,
        refresh_path: impl Into<String>,
        threshold: Duration,
    ) -> Self {
        Self {
            store,
            session,
            transport,
            refresh_path: refresh_path.into(),
            threshold,
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub async fn ensure_fresh(&self) -> RefreshOutcome {
        let Some(pair) = self.store.get() else {
            return RefreshOutcome::NoCredentials;
        };

        let now = Utc::now();
        let time_left = access_time_left(&pair, now);
        // an expired token is never fresh, even with a zero threshold
        if time_left >= self.threshold && time_left > Duration::zero() {
            return RefreshOutcome::Fresh;
        }

        if !pair.is_refresh_usable(now) {
            debug!(
                seconds_left = time_left.num_seconds(),
                "Access token near expiry and no usable refresh token"
            );
            return RefreshOutcome::RefreshUnavailable;
        }

        info!(seconds_left = time_left.num_seconds(), "Refreshing access token");
        match self.exchange(&pair.refresh_token).await {
            Ok((access_token, expires_at)) => {
                if self.store.set_access(access_token, expires_at) {
                    self.session.set_session_state(SessionState::LoggedIn);
                    RefreshOutcome::Refreshed
                } else {
                    debug!("Session ended while refresh was in flight, discarding token");
                    RefreshOutcome::NoCredentials
                }
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, ending session");
                self.store.clear();
                self.session.set_session_state(SessionState::NotLoggedIn);
                RefreshOutcome::Failed
            }
        }
    }

    /// Trade the refresh token for a new access token and its expiry instant
    async fn exchange(&self, refresh_token: &str) -> Result<(String, DateTime<Utc>), ApiError> {
        let body = serde_json::to_value(RefreshRequest {
            refresh_token: refresh_token.to_string(),
        })
        .map_err(|e| ApiError::InvalidResponse(format!("Failed to encode refresh request: {}", e)))?;
        let request = ApiRequest::post(self.refresh_path.as_str()).unauthenticated().json(body);

        let response = self.transport.send(request).await?.error_for_status()?;
        let grant: RefreshResponse = response.json()?;
        let expires_at = expiry_after(Utc::now(), grant.access_token_expiration_time).ok_or_else(|| {
            ApiError::InvalidResponse(format!(
                "Access token lifetime out of range: {} ms",
                grant.access_token_expiration_time
            ))
        })?;
        Ok((grant.access_token, expires_at))
    }
}
