// Authentication types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Access token / refresh token / expiry triple
///
/// Treated as an immutable value: a refresh produces a new instance that
/// replaces the stored one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub access_token: String,
    /// Empty when the grant did not issue one (client credentials flow)
    #[serde(default)]
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credentials {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
        }
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Expired or expiring within `threshold`
    pub fn expires_within(&self, threshold: Duration) -> bool {
        self.expires_at <= Utc::now() + threshold
    }
}

/// Token endpoint response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Convert into credentials; `None` when the token is not properly formatted
    pub fn into_credentials(self) -> Option<Credentials> {
        let access_token = self.access_token.filter(|t| !t.is_empty())?;
        let expires_in = self.expires_in.filter(|e| *e != 0)?;
        Some(Credentials {
            access_token,
            refresh_token: self.refresh_token.unwrap_or_default(),
            expires_at: Utc::now() + Duration::seconds(expires_in),
        })
    }
}

/// Currently logged-in user, as returned by `/oauth2/userinfo`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Unique external id of the user
    pub sub: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
}
