use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::ApiError;
use crate::auth::CredentialPair;

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(alias = "_id")]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Token grant returned by login and register. Expiration times are
/// lifetimes in milliseconds, not instants.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    #[serde(alias = "accessToken")]
    pub access_token: String,
    #[serde(alias = "refreshToken")]
    pub refresh_token: String,
    #[serde(alias = "accessExpiresInMs")]
    pub access_token_expiration_time: i64,
    #[serde(alias = "refreshExpiresInMs")]
    pub refresh_token_expiration_time: i64,
    #[serde(default)]
    pub user: Option<User>,
}

impl AuthResponse {
    /// Anchor the grant's lifetimes at `received_at`. Lifetimes too large
    /// to represent are rejected as an invalid response.
    pub fn into_credentials(self, received_at: DateTime<Utc>) -> Result<(CredentialPair, Option<User>), ApiError> {
        let (access_ms, refresh_ms) = (self.access_token_expiration_time, self.refresh_token_expiration_time);
        let pair = CredentialPair::from_lifetimes(self.access_token, self.refresh_token, access_ms, refresh_ms, received_at)
            .ok_or_else(|| {
                ApiError::InvalidResponse(format!(
                    "Token lifetime out of range (access {} ms, refresh {} ms)",
                    access_ms, refresh_ms
                ))
            })?;
        Ok((pair, self.user))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    #[serde(alias = "accessToken")]
    pub access_token: String,
    #[serde(alias = "accessExpiresInMs")]
    pub access_token_expiration_time: i64,
}
