//! Shared helpers for the flow integration tests
#![allow(dead_code)] // each test binary uses a different subset

use std::sync::Arc;

use async_trait::async_trait;
use oauth2_mux::error::FlowError;
use oauth2_mux::provider::AuthFlow;
use oauth2_mux::types::{AccessType, OAuthToken};

/// Provider double that skips the network: authorization URLs are
/// deterministic and the code exchange mints a token derived from the code.
pub struct FakeFlow {
    name: &'static str,
    fail_exchange: bool,
}

impl FakeFlow {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fail_exchange: false,
        }
    }

    /// Make every code exchange fail, as a rejecting provider would
    pub fn failing(name: &'static str) -> Self {
        Self {
            name,
            fail_exchange: true,
        }
    }

    pub fn shared(name: &'static str) -> Arc<dyn AuthFlow> {
        Arc::new(Self::new(name))
    }
}

#[async_trait]
impl AuthFlow for FakeFlow {
    fn name(&self) -> &str {
        self.name
    }

    fn authorization_url(
        &self,
        state: &str,
        access_type: AccessType,
        force_prompt: bool,
    ) -> String {
        format!(
            "https://idp.test/{}/authorize?state={state}&access_type={}&force_prompt={force_prompt}",
            self.name,
            access_type.as_str()
        )
    }

    async fn exchange_code(
        &self,
        code: &str,
        access_type: AccessType,
    ) -> Result<OAuthToken, FlowError> {
        if self.fail_exchange {
            return Err(FlowError::Exchange("provider rejected the code".to_string()));
        }
        Ok(OAuthToken {
            access_token: format!("{}-token-{code}", self.name),
            refresh_token: matches!(access_type, AccessType::Offline)
                .then(|| format!("{}-refresh", self.name)),
            token_type: "Bearer".to_string(),
            expires_at: None,
            scopes: None,
        })
    }
}

/// Location header of a redirect response
pub fn location(response: &axum::response::Response) -> String {
    response
        .headers()
        .get(axum::http::header::LOCATION)
        .expect("redirect response carries a Location header")
        .to_str()
        .unwrap()
        .to_string()
}
