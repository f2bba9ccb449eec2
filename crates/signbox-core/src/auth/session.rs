use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

use super::refresher::access_time_left;
use super::CredentialPair;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    LoggedIn,
    NotLoggedIn,
}

impl SessionState {
    /// Startup value: logged in only if a stored access token has time left,
    /// judged the same way the refresher judges it.
    pub fn from_stored(pair: Option<&CredentialPair>) -> Self {
        match pair {
            Some(p) if access_time_left(p, Utc::now()) > Duration::zero() => SessionState::LoggedIn,
            _ => SessionState::NotLoggedIn,
        }
    }

    pub fn is_logged_in(self) -> bool {
        self == SessionState::LoggedIn
    }
}

/// Observable, process-wide login flag.
///
/// Clones share the same cell. Observers call `subscribe()` and await
/// changes; only the request layer and explicit logout call
/// `set_session_state`.
#[derive(Clone)]
pub struct SessionNotifier {
    tx: watch::Sender<SessionState>,
}

impl SessionNotifier {
    pub fn new(initial: SessionState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn current(&self) -> SessionState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    pub fn set_session_state(&self, state: SessionState) {
        let previous = self.tx.send_replace(state);
        if previous != state {
            info!(from = ?previous, to = ?state, "Session state changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::encode_test_jwt;
    use crate::auth::store::pair_expiring_in;

    #[test]
    fn test_initial_state_from_stored_pair() {
        assert_eq!(SessionState::from_stored(None), SessionState::NotLoggedIn);

        let fresh = pair_expiring_in(Duration::minutes(10), Duration::days(1));
        assert_eq!(SessionState::from_stored(Some(&fresh)), SessionState::LoggedIn);

        let stale = pair_expiring_in(Duration::minutes(-1), Duration::days(1));
        assert_eq!(SessionState::from_stored(Some(&stale)), SessionState::NotLoggedIn);
    }

    #[test]
    fn test_unreadable_jwt_starts_logged_out() {
        let mut pair = pair_expiring_in(Duration::hours(1), Duration::days(1));
        pair.access_token = "aGVhZA.bm90IGpzb24.c2ln".to_string();
        assert_eq!(SessionState::from_stored(Some(&pair)), SessionState::NotLoggedIn);

        // an already-lapsed exp claim wins over a later stored expiry
        pair.access_token = encode_test_jwt((Utc::now() - Duration::minutes(1)).timestamp());
        assert_eq!(SessionState::from_stored(Some(&pair)), SessionState::NotLoggedIn);

        pair.access_token = encode_test_jwt((Utc::now() + Duration::minutes(30)).timestamp());
        assert_eq!(SessionState::from_stored(Some(&pair)), SessionState::LoggedIn);
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let notifier = SessionNotifier::new(SessionState::LoggedIn);
        let mut rx = notifier.subscribe();

        notifier.set_session_state(SessionState::NotLoggedIn);
        rx.changed().await.expect("sender alive");
        assert_eq!(*rx.borrow_and_update(), SessionState::NotLoggedIn);
        assert_eq!(notifier.current(), SessionState::NotLoggedIn);
    }

    #[test]
    fn test_set_without_subscribers_still_updates() {
        let notifier = SessionNotifier::new(SessionState::NotLoggedIn);
        let shared = notifier.clone();
        shared.set_session_state(SessionState::LoggedIn);
        assert!(notifier.current().is_logged_in());
    }
}
