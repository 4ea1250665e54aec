//! Configuration loading
//!
//! Settings are loaded from a TOML file with environment-variable overrides
//! (prefix `OAUTH2_`), environment taking precedence, on top of serde
//! defaults:
//!
//! ```toml
//! # oauth2.toml
//! session_namespace = "oauth"
//! base_url = "/auth"
//! default_login_url = "/"
//! default_logout_url = "/"
//! offline_access = false
//!
//! [[providers]]
//! name = "google"
//! client_id = "..."
//! client_secret = "..."
//! auth_url = "https://accounts.google.com/o/oauth2/v2/auth"
//! token_url = "https://oauth2.googleapis.com/token"
//! redirect_uri = "https://app.example.com/auth/google/_cb"
//! scopes = ["openid", "email"]
//! ```

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::types::RedirectUrls;

/// Client configuration for one OAuth2 provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Unique provider name within the group
    pub name: String,
    /// OAuth2 client id
    pub client_id: String,
    /// OAuth2 client secret
    pub client_secret: String,
    /// Provider authorization endpoint
    pub auth_url: String,
    /// Provider token endpoint
    pub token_url: String,
    /// Redirect URI registered with the provider
    pub redirect_uri: String,
    /// Scopes requested at login
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Settings for a whole provider group
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupSettings {
    /// Session namespace prefix shared by the group
    pub session_namespace: String,
    /// Externally visible base URL for the group's routes
    pub base_url: String,
    /// Fallback post-login redirect target
    pub default_login_url: String,
    /// Fallback post-logout redirect target
    pub default_logout_url: String,
    /// Request offline (refresh-capable) access for every login
    pub offline_access: bool,
    /// The configured providers
    pub providers: Vec<ProviderSettings>,
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            session_namespace: "oauth".to_string(),
            base_url: "/auth".to_string(),
            default_login_url: "/".to_string(),
            default_logout_url: "/".to_string(),
            offline_access: false,
            providers: Vec::new(),
        }
    }
}

impl GroupSettings {
    /// Load from `./oauth2.toml` plus `OAUTH2_*` environment overrides
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from("oauth2.toml")
    }

    /// Load from a specific TOML file plus `OAUTH2_*` environment overrides
    pub fn load_from(path: &str) -> anyhow::Result<Self> {
        let settings = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("OAUTH2_"))
            .extract()?;
        Ok(settings)
    }

    /// The redirect fallbacks as a [`RedirectUrls`]
    #[must_use]
    pub fn redirect_urls(&self) -> RedirectUrls {
        RedirectUrls {
            default_login_url: self.default_login_url.clone(),
            default_logout_url: self.default_logout_url.clone(),
        }
        .or_defaults()
    }
}
