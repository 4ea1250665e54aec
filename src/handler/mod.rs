//! Single-provider flow engine
//!
//! [`ProviderHandler`] drives the authorization-code flow for one provider:
//! it owns the CSRF state protocol, the session-bound credential, and the
//! three flow operations (`/login`, `/_cb`, `/logout`). Per session
//! namespace the states are: logged out (nothing stored), login pending
//! (`state` + `redirect_to` stored), logged in (valid `token` stored).

use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use rand::RngCore;
use serde::Deserialize;
use url::form_urlencoded;

use crate::error::FlowError;
use crate::provider::AuthFlow;
use crate::session::Sessions;
use crate::types::{AccessType, OAuthToken, RedirectUrls};

/// Flow engine for one OAuth2 provider
///
/// Immutable after construction and safe to share across requests; all
/// mutable state lives in the session store.
pub struct ProviderHandler {
    flow: Arc<dyn AuthFlow>,
    session_namespace: String,
    base_url: String,
    urls: RedirectUrls,
    offline_access: bool,
}

impl ProviderHandler {
    /// Create a handler for one provider.
    ///
    /// `session_namespace` must not collide with any other handler sharing
    /// the session store. `base_url` is the externally visible prefix for
    /// this handler's routes; a trailing `/` is trimmed. Empty redirect
    /// defaults fall back to `/`.
    pub fn new(
        flow: Arc<dyn AuthFlow>,
        session_namespace: impl Into<String>,
        base_url: impl Into<String>,
        urls: RedirectUrls,
    ) -> Self {
        Self {
            flow,
            session_namespace: session_namespace.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            urls: urls.or_defaults(),
            offline_access: false,
        }
    }

    /// Request offline (refresh-capable) access for every login this
    /// handler initiates. Set once before serving traffic.
    #[must_use]
    pub fn request_offline_access(mut self) -> Self {
        self.offline_access = true;
        self
    }

    /// The provider's name
    #[must_use]
    pub fn name(&self) -> &str {
        self.flow.name()
    }

    /// This handler's slice of session storage
    #[must_use]
    pub fn session_namespace(&self) -> &str {
        &self.session_namespace
    }

    /// The externally visible prefix for this handler's routes
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    const fn access_type(&self) -> AccessType {
        if self.offline_access {
            AccessType::Offline
        } else {
            AccessType::Online
        }
    }

    /// Router serving `/login`, `/logout` and `/_cb`, to be nested under
    /// [`base_url`](Self::base_url) by the host
    #[must_use]
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/login", get(login).post(login))
            .route("/logout", get(logout).post(logout))
            .route("/_cb", get(callback))
            .with_state(self)
    }

    /// The currently stored credential, if valid.
    ///
    /// Side-effect-free: an expired or absent credential reads as `None`
    /// and nothing is deleted.
    pub async fn token(&self, sessions: &Sessions) -> Result<Option<OAuthToken>, FlowError> {
        let session = sessions.load(&self.session_namespace).await?;
        Ok(session.valid_token().cloned())
    }

    /// Whether the user is logged in with this provider
    pub async fn logged_in(&self, sessions: &Sessions) -> Result<bool, FlowError> {
        Ok(self.token(sessions).await?.is_some())
    }

    /// Clear this provider's entire session namespace. Idempotent.
    pub async fn logout(&self, sessions: &Sessions) -> Result<(), FlowError> {
        sessions.clear(&self.session_namespace).await?;
        Ok(())
    }

    /// Login URL for this provider, with percent-encoded query values.
    ///
    /// `redirect_to` is where the user lands after the flow; `force_prompt`
    /// asks the provider to re-show its consent UI even for a standing
    /// approval.
    #[must_use]
    pub fn login_url(&self, redirect_to: &str, force_prompt: bool) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("redirect_to", redirect_to)
            .append_pair("force_prompt", if force_prompt { "true" } else { "false" })
            .finish();
        format!("{}/login?{query}", self.base_url)
    }

    /// Logout URL for this provider
    #[must_use]
    pub fn logout_url(&self, redirect_to: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("redirect_to", redirect_to)
            .finish();
        format!("{}/logout?{query}", self.base_url)
    }

    pub(crate) async fn handle_login(
        &self,
        sessions: &Sessions,
        query: LoginQuery,
    ) -> Result<Response, FlowError> {
        let mut session = sessions.load(&self.session_namespace).await?;

        let force_prompt = query.force_prompt();
        let redirect_to = query
            .redirect_to
            .filter(|target| !target.is_empty())
            .unwrap_or_else(|| self.urls.default_login_url.clone());

        if !force_prompt && session.logged_in() {
            // Already holding a valid credential: no state, no provider
            // round trip.
            return Ok(Redirect::to(&redirect_to).into_response());
        }

        let state = new_state();
        session.state = Some(state.clone());
        session.redirect_to = Some(redirect_to);
        sessions.save(&self.session_namespace, &session).await?;

        let url = self
            .flow
            .authorization_url(&state, self.access_type(), force_prompt);
        tracing::debug!(provider = self.name(), "redirecting to authorization endpoint");
        Ok(Redirect::to(&url).into_response())
    }

    pub(crate) async fn handle_callback(
        &self,
        sessions: &Sessions,
        query: CallbackQuery,
    ) -> Result<Response, FlowError> {
        let mut session = sessions.load(&self.session_namespace).await?;

        let stored_state = session
            .state
            .as_deref()
            .ok_or(FlowError::MissingLoginState)?;
        let redirect_to = session
            .redirect_to
            .clone()
            .ok_or(FlowError::MissingRedirectTarget)?;
        if query.state.as_deref() != Some(stored_state) {
            return Err(FlowError::CsrfDetected);
        }

        let code = query.code.unwrap_or_default();
        let token = self.flow.exchange_code(&code, self.access_type()).await?;
        tracing::debug!(provider = self.name(), "token exchange completed");

        session.token = Some(token);
        // The round trip is over; dropping the state token keeps a replayed
        // callback from matching it again.
        session.state = None;
        session.redirect_to = None;
        sessions.save(&self.session_namespace, &session).await?;

        Ok(Redirect::to(&redirect_to).into_response())
    }

    pub(crate) async fn handle_logout(
        &self,
        sessions: &Sessions,
        query: LogoutQuery,
    ) -> Result<Response, FlowError> {
        self.logout(sessions).await?;
        let redirect_to = query
            .redirect_to
            .filter(|target| !target.is_empty())
            .unwrap_or_else(|| self.urls.default_logout_url.clone());
        Ok(Redirect::to(&redirect_to).into_response())
    }
}

/// Query parameters accepted by `/login`
#[derive(Debug, Default, Deserialize)]
pub(crate) struct LoginQuery {
    pub redirect_to: Option<String>,
    pub force_prompt: Option<String>,
}

impl LoginQuery {
    /// Unparseable values read as `false`
    pub(crate) fn force_prompt(&self) -> bool {
        self.force_prompt
            .as_deref()
            .and_then(|value| value.parse().ok())
            .unwrap_or(false)
    }
}

/// Query parameters the provider sends to `/_cb`
#[derive(Debug, Default, Deserialize)]
pub(crate) struct CallbackQuery {
    pub state: Option<String>,
    pub code: Option<String>,
}

/// Query parameters accepted by `/logout`
#[derive(Debug, Default, Deserialize)]
pub(crate) struct LogoutQuery {
    pub redirect_to: Option<String>,
}

/// Freshly generated unguessable CSRF state token (128 bits, hex)
fn new_state() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

async fn login(
    State(handler): State<Arc<ProviderHandler>>,
    sessions: Sessions,
    Query(query): Query<LoginQuery>,
) -> Result<Response, FlowError> {
    handler.handle_login(&sessions, query).await
}

async fn callback(
    State(handler): State<Arc<ProviderHandler>>,
    sessions: Sessions,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, FlowError> {
    handler.handle_callback(&sessions, query).await
}

async fn logout(
    State(handler): State<Arc<ProviderHandler>>,
    sessions: Sessions,
    Query(query): Query<LogoutQuery>,
) -> Result<Response, FlowError> {
    handler.handle_logout(&sessions, query).await
}

/// Middleware redirecting logged-out users to this provider's login URL
///
/// The current request URI becomes the post-login redirect target. Use with
/// `axum::middleware::from_fn`:
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use oauth2_mux::handler::{LoginRequired, ProviderHandler};
/// # fn example(handler: Arc<ProviderHandler>) -> axum::Router {
/// let guard = LoginRequired::new(handler);
/// axum::Router::new()
///     .route("/app", axum::routing::get(|| async { "hi" }))
///     .layer(axum::middleware::from_fn(move |req, next| {
///         guard.clone().handle(req, next)
///     }))
/// # }
/// ```
#[derive(Clone)]
pub struct LoginRequired {
    handler: Arc<ProviderHandler>,
    force_prompt: bool,
}

impl LoginRequired {
    /// Guard routes behind this provider's login
    #[must_use]
    pub fn new(handler: Arc<ProviderHandler>) -> Self {
        Self {
            handler,
            force_prompt: false,
        }
    }

    /// Always re-prompt at the provider when redirecting to login
    #[must_use]
    pub fn with_force_prompt(mut self) -> Self {
        self.force_prompt = true;
        self
    }

    /// Run the guard: pass the request through when a valid credential is
    /// stored, redirect to the login URL otherwise.
    pub async fn handle(self, request: Request, next: Next) -> Result<Response, FlowError> {
        let sessions = request
            .extensions()
            .get::<Sessions>()
            .cloned()
            .ok_or(FlowError::MissingSessionLayer)?;
        if self.handler.token(&sessions).await?.is_none() {
            let login = self
                .handler
                .login_url(&request.uri().to_string(), self.force_prompt);
            return Ok(Redirect::to(&login).into_response());
        }
        Ok(next.run(request).await)
    }
}
