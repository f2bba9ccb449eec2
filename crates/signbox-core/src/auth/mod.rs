//! Authentication state for the request layer.
//!
//! This module provides:
//! - `CredentialStore`: the access/refresh token pair, optionally mirrored to disk
//! - `Refresher`: proactive access-token renewal before expiry
//! - `SessionNotifier`: the observable logged-in/logged-out flag
//! - `Keychain`: remembered passwords via the OS keyring
//! - `claims`: local decoding of the JWT `exp` claim

pub mod claims;
pub mod keychain;
pub mod refresher;
pub mod session;
pub mod store;

pub use claims::{decode_expiry, ClaimError};
pub use keychain::Keychain;
pub use refresher::{access_time_left, RefreshOutcome, Refresher};
pub use session::{SessionNotifier, SessionState};
pub use store::{CredentialPair, CredentialStore};
