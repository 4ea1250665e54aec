//! OAuth2 provider configuration and the delegated wire protocol
//!
//! [`Provider`] wraps one identity provider's client configuration and
//! delegates authorization-URL construction and the code-for-token exchange
//! to the `oauth2` crate. The flow engine reaches it through the
//! [`AuthFlow`] trait so tests can substitute a fake exchanger.

use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    RedirectUrl, Scope, TokenResponse, TokenUrl,
};

use crate::config::ProviderSettings;
use crate::error::FlowError;
use crate::types::{AccessType, OAuthToken};

/// `oauth2` client with authorization and token endpoints configured
type ConfiguredClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// The two calls the flow engine makes against a provider
///
/// The engine decides *when* to call these and which options to pass; the
/// implementation owns the wire protocol.
#[async_trait]
pub trait AuthFlow: Send + Sync {
    /// Unique provider name within a group
    fn name(&self) -> &str;

    /// Absolute authorization endpoint URL carrying the given CSRF state,
    /// access type, and approval-force option
    fn authorization_url(
        &self,
        state: &str,
        access_type: AccessType,
        force_prompt: bool,
    ) -> String;

    /// Exchange an authorization code for a credential
    async fn exchange_code(
        &self,
        code: &str,
        access_type: AccessType,
    ) -> Result<OAuthToken, FlowError>;
}

/// Immutable configuration for one OAuth2 identity provider
pub struct Provider {
    name: String,
    client: ConfiguredClient,
    scopes: Vec<Scope>,
    http_client: reqwest::Client,
}

impl Provider {
    /// Build a provider from its settings.
    ///
    /// Fails with [`FlowError::Config`] if any endpoint URL is invalid or
    /// the name is empty.
    pub fn new(settings: &ProviderSettings) -> Result<Self, FlowError> {
        if settings.name.is_empty() {
            return Err(FlowError::Config("empty provider name".to_string()));
        }

        let client = BasicClient::new(ClientId::new(settings.client_id.clone()))
            .set_client_secret(ClientSecret::new(settings.client_secret.clone()))
            .set_auth_uri(
                AuthUrl::new(settings.auth_url.clone())
                    .map_err(|e| FlowError::Config(format!("invalid auth URL: {e}")))?,
            )
            .set_token_uri(
                TokenUrl::new(settings.token_url.clone())
                    .map_err(|e| FlowError::Config(format!("invalid token URL: {e}")))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(settings.redirect_uri.clone())
                    .map_err(|e| FlowError::Config(format!("invalid redirect URI: {e}")))?,
            );

        // Following redirects on the token endpoint would be an SSRF vector.
        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| FlowError::Config(format!("http client: {e}")))?;

        Ok(Self {
            name: settings.name.clone(),
            client,
            scopes: settings
                .scopes
                .iter()
                .map(|scope| Scope::new(scope.clone()))
                .collect(),
            http_client,
        })
    }
}

#[async_trait]
impl AuthFlow for Provider {
    fn name(&self) -> &str {
        &self.name
    }

    fn authorization_url(
        &self,
        state: &str,
        access_type: AccessType,
        force_prompt: bool,
    ) -> String {
        let state = state.to_string();
        let mut request = self
            .client
            .authorize_url(move || CsrfToken::new(state))
            .add_extra_param("access_type", access_type.as_str());
        for scope in &self.scopes {
            request = request.add_scope(scope.clone());
        }
        if force_prompt {
            request = request.add_extra_param("approval_prompt", "force");
        }
        let (url, _state) = request.url();
        url.to_string()
    }

    async fn exchange_code(
        &self,
        code: &str,
        access_type: AccessType,
    ) -> Result<OAuthToken, FlowError> {
        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .add_extra_param("access_type", access_type.as_str())
            .request_async(&self.http_client)
            .await
            .map_err(|e| FlowError::Exchange(e.to_string()))?;

        Ok(OAuthToken {
            access_token: response.access_token().secret().clone(),
            refresh_token: response.refresh_token().map(|t| t.secret().clone()),
            token_type: "Bearer".to_string(),
            expires_at: response
                .expires_in()
                .and_then(|d| chrono::Duration::from_std(d).ok())
                .map(|d| chrono::Utc::now() + d),
            scopes: response
                .scopes()
                .map(|scopes| scopes.iter().map(|s| s.as_str().to_string()).collect()),
        })
    }
}
