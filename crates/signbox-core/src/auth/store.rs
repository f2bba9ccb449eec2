use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Session file name in cache directory
pub const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

impl CredentialPair {
    /// Build a pair from the relative lifetimes the auth endpoint returns.
    /// Durations are anchored at `received_at`; `None` if either expiry
    /// falls outside the representable range.
    pub fn from_lifetimes(
        access_token: String,
        refresh_token: String,
        access_expires_in_ms: i64,
        refresh_expires_in_ms: i64,
        received_at: DateTime<Utc>,
    ) -> Option<Self> {
        Some(Self {
            access_token,
            refresh_token,
            access_expires_at: expiry_after(received_at, access_expires_in_ms)?,
            refresh_expires_at: expiry_after(received_at, refresh_expires_in_ms)?,
        })
    }

    pub fn is_refresh_usable(&self, now: DateTime<Utc>) -> bool {
        !self.refresh_token.is_empty() && now < self.refresh_expires_at
    }

    pub fn time_until_access_expiry(&self, now: DateTime<Utc>) -> Duration {
        self.access_expires_at - now
    }
}

/// Instant `lifetime_ms` after `from`, or `None` on overflow.
pub fn expiry_after(from: DateTime<Utc>, lifetime_ms: i64) -> Option<DateTime<Utc>> {
    from.checked_add_signed(Duration::try_milliseconds(lifetime_ms)?)
}

/// The single owner of the current credential pair.
///
/// Reads clone the pair out so no lock is ever held across an `.await`.
/// Writes replace the whole value, so concurrent writers resolve as
/// last-writer-wins and readers never observe a half-written pair.
pub struct CredentialStore {
    path: Option<PathBuf>,
    pair: RwLock<Option<CredentialPair>>,
}

impl CredentialStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            pair: RwLock::new(None),
        }
    }

    /// Open a store mirrored to `<cache_dir>/session.json`, loading any pair
    /// already saved there.
    pub fn persistent(cache_dir: &Path) -> Result<Self> {
        let path = cache_dir.join(SESSION_FILE);
        let pair = Self::load(&path)?;
        debug!(path = %path.display(), has_pair = pair.is_some(), "Credential store opened");
        Ok(Self {
            path: Some(path),
            pair: RwLock::new(pair),
        })
    }

    pub fn get(&self) -> Option<CredentialPair> {
        self.pair.read().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.pair.read().as_ref().map(|p| p.access_token.clone())
    }

    pub fn set(&self, pair: CredentialPair) {
        let mut guard = self.pair.write();
        *guard = Some(pair);
        self.persist(guard.as_ref());
    }

    /// Replace only the access half of the pair after a refresh.
    ///
    /// Returns `false` and leaves the store empty if it was cleared while the
    /// refresh was in flight.
    pub fn set_access(&self, access_token: String, access_expires_at: DateTime<Utc>) -> bool {
        let mut guard = self.pair.write();
        let Some(pair) = guard.as_mut() else {
            return false;
        };
        pair.access_token = access_token;
        pair.access_expires_at = access_expires_at;
        self.persist(guard.as_ref());
        true
    }

    pub fn clear(&self) {
        let mut guard = self.pair.write();
        *guard = None;
        self.persist(None);
    }

    fn load(path: &Path) -> Result<Option<CredentialPair>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path).context("Failed to read session file")?;
        let pair: CredentialPair =
            serde_json::from_str(&contents).context("Failed to parse session file")?;
        Ok(Some(pair))
    }

    fn persist(&self, pair: Option<&CredentialPair>) {
        let Some(ref path) = self.path else {
            return;
        };
        let result = match pair {
            Some(pair) => Self::save(path, pair),
            None => Self::remove(path),
        };
        if let Err(e) = result {
            warn!(error = %e, path = %path.display(), "Failed to persist session");
        }
    }

    fn save(path: &Path, pair: &CredentialPair) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(pair)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn remove(path: &Path) -> Result<()> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn pair_expiring_in(access: Duration, refresh: Duration) -> CredentialPair {
    let now = Utc::now();
    CredentialPair {
        access_token: "access-1".to_string(),
        refresh_token: "refresh-1".to_string(),
        access_expires_at: now + access,
        refresh_expires_at: now + refresh,
    }
}
