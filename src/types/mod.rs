//! Shared leaf types: stored credentials, access types, redirect defaults

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Seconds before the recorded expiry at which a token is already treated
/// as expired, to absorb clock skew and in-flight latency.
const EXPIRY_DELTA_SECS: i64 = 10;

/// Credential obtained from a provider's token endpoint
///
/// This is the value persisted in session storage under a provider's
/// namespace. It carries no client id or secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    /// Bearer access token
    pub access_token: String,
    /// Refresh token, present only for offline-access grants
    pub refresh_token: Option<String>,
    /// Token type reported by the provider (normally `Bearer`)
    pub token_type: String,
    /// Expiry instant, if the provider reported one
    pub expires_at: Option<DateTime<Utc>>,
    /// Scopes granted, if the provider reported them
    pub scopes: Option<Vec<String>>,
}

impl OAuthToken {
    /// Whether this token can still be presented to the provider.
    ///
    /// A token with no recorded expiry is considered valid. Tokens within
    /// [`EXPIRY_DELTA_SECS`] of their expiry are already treated as expired.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        match self.expires_at {
            None => true,
            Some(expires_at) => Utc::now() + Duration::seconds(EXPIRY_DELTA_SECS) < expires_at,
        }
    }
}

/// Token access type requested from the provider
///
/// Offline access asks the provider for a long-lived refresh capability;
/// online access does not. The same access type is sent when initiating a
/// login and when exchanging its authorization code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    /// Short-lived credential only
    Online,
    /// Request a refresh-capable credential
    Offline,
}

impl AccessType {
    /// Wire value for the `access_type` authorization parameter
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

/// Fallback redirect targets used when a request supplies none
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedirectUrls {
    /// Where to send the user after a login flow completes
    pub default_login_url: String,
    /// Where to send the user after logout
    pub default_logout_url: String,
}

impl Default for RedirectUrls {
    fn default() -> Self {
        Self {
            default_login_url: "/".to_string(),
            default_logout_url: "/".to_string(),
        }
    }
}

impl RedirectUrls {
    /// Replace empty fields with the `/` fallback
    #[must_use]
    pub fn or_defaults(mut self) -> Self {
        if self.default_login_url.is_empty() {
            self.default_login_url = "/".to_string();
        }
        if self.default_logout_url.is_empty() {
            self.default_logout_url = "/".to_string();
        }
        self
    }
}
