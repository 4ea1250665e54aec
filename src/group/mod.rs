//! Multi-provider aggregation
//!
//! [`ProviderGroup`] composes one [`ProviderHandler`] per configured
//! provider under a shared namespace prefix and base URL, and adds the
//! cross-provider operations: aggregate token lookup, logout-all, and a
//! login gate that does not presuppose which provider the user will choose.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use futures_util::future;
use url::form_urlencoded;

use crate::config::GroupSettings;
use crate::error::{AggregateError, FlowError};
use crate::handler::{CallbackQuery, LoginQuery, LogoutQuery, ProviderHandler};
use crate::provider::{AuthFlow, Provider};
use crate::session::Sessions;
use crate::types::{OAuthToken, RedirectUrls};

/// Sub-path reserved for the group's own routes
const RESERVED_NAME: &str = "all";

/// Flow engines for several providers behind one base URL
///
/// For providers `google` and `github` mounted at `/auth`, the group serves
/// `/auth/google/login`, `/auth/google/logout`, `/auth/google/_cb`, the same
/// for `github`, and `/auth/all/logout`.
pub struct ProviderGroup {
    handlers: BTreeMap<String, ProviderHandler>,
    base_url: String,
    urls: RedirectUrls,
}

impl ProviderGroup {
    /// Compose a group from independently configured providers.
    ///
    /// Each provider gets the session namespace
    /// `{session_namespace}-{name}` and the base URL
    /// `{group_base_url}/{name}`. Fails with [`FlowError::Config`] if a
    /// provider name is empty, duplicated, or the reserved `all`.
    pub fn new(
        session_namespace: &str,
        group_base_url: &str,
        urls: RedirectUrls,
        flows: Vec<Arc<dyn AuthFlow>>,
    ) -> Result<Self, FlowError> {
        let base_url = group_base_url.trim_end_matches('/').to_string();
        let urls = urls.or_defaults();

        let mut handlers = BTreeMap::new();
        for flow in flows {
            let name = flow.name().to_string();
            if name.is_empty() {
                return Err(FlowError::Config("empty provider name".to_string()));
            }
            if name == RESERVED_NAME {
                return Err(FlowError::Config(format!(
                    "provider name {RESERVED_NAME:?} is reserved"
                )));
            }
            if handlers.contains_key(&name) {
                return Err(FlowError::Config(format!(
                    "two providers given with name {name:?}"
                )));
            }
            let handler = ProviderHandler::new(
                flow,
                format!("{session_namespace}-{name}"),
                format!("{base_url}/{name}"),
                urls.clone(),
            );
            handlers.insert(name, handler);
        }

        Ok(Self {
            handlers,
            base_url,
            urls,
        })
    }

    /// Build providers and the group straight from loaded settings
    pub fn from_settings(settings: &GroupSettings) -> Result<Self, FlowError> {
        let flows = settings
            .providers
            .iter()
            .map(|provider| {
                Provider::new(provider).map(|p| Arc::new(p) as Arc<dyn AuthFlow>)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let group = Self::new(
            &settings.session_namespace,
            &settings.base_url,
            settings.redirect_urls(),
            flows,
        )?;
        Ok(if settings.offline_access {
            group.request_offline_access()
        } else {
            group
        })
    }

    /// Request offline access for every handler in the group. Set once
    /// before serving traffic.
    #[must_use]
    pub fn request_offline_access(mut self) -> Self {
        self.handlers = self
            .handlers
            .into_iter()
            .map(|(name, handler)| (name, handler.request_offline_access()))
            .collect();
        self
    }

    /// The group's externally visible base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The handler for a named provider
    #[must_use]
    pub fn handler(&self, provider_name: &str) -> Option<&ProviderHandler> {
        self.handlers.get(provider_name)
    }

    /// Provider names in this group, sorted
    pub fn provider_names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Login URL for a named provider
    pub fn login_url(
        &self,
        provider_name: &str,
        redirect_to: &str,
        force_prompt: bool,
    ) -> Result<String, FlowError> {
        self.handlers
            .get(provider_name)
            .map(|handler| handler.login_url(redirect_to, force_prompt))
            .ok_or_else(|| FlowError::UnknownProvider(provider_name.to_string()))
    }

    /// Logout URL for a named provider
    pub fn logout_url(&self, provider_name: &str, redirect_to: &str) -> Result<String, FlowError> {
        self.handlers
            .get(provider_name)
            .map(|handler| handler.logout_url(redirect_to))
            .ok_or_else(|| FlowError::UnknownProvider(provider_name.to_string()))
    }

    /// Logout URL covering every provider in the group
    #[must_use]
    pub fn logout_all_url(&self, redirect_to: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("redirect_to", redirect_to)
            .finish();
        format!("{}/all/logout?{query}", self.base_url)
    }

    /// Router serving every provider's sub-paths plus `/all/logout`, to be
    /// nested under [`base_url`](Self::base_url) by the host
    #[must_use]
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/all/logout", get(logout_all).post(logout_all))
            .route("/{provider}/login", get(login).post(login))
            .route("/{provider}/logout", get(logout).post(logout))
            .route("/{provider}/_cb", get(callback))
            .with_state(self)
    }

    /// Valid tokens for every currently-logged-in provider.
    ///
    /// Best-effort: a failure on one provider's session lookup does not
    /// hide the others' tokens; any failures come back combined alongside
    /// the partial map.
    pub async fn tokens(
        &self,
        sessions: &Sessions,
    ) -> (BTreeMap<String, OAuthToken>, Option<AggregateError>) {
        let lookups = self.handlers.iter().map(|(name, handler)| async move {
            (name.clone(), handler.token(sessions).await)
        });

        let mut tokens = BTreeMap::new();
        let mut failures = Vec::new();
        for (name, result) in future::join_all(lookups).await {
            match result {
                Ok(Some(token)) => {
                    tokens.insert(name, token);
                }
                Ok(None) => {}
                Err(error) => failures.push((name, error)),
            }
        }
        (tokens, AggregateError::from_failures(failures))
    }

    /// Whether the user is logged in with any provider in the group
    pub async fn logged_in(&self, sessions: &Sessions) -> (bool, Option<AggregateError>) {
        let (tokens, error) = self.tokens(sessions).await;
        (!tokens.is_empty(), error)
    }

    /// Clear every provider's session namespace.
    ///
    /// Best-effort: a failure on one provider does not prevent clearing the
    /// others.
    pub async fn logout_all(&self, sessions: &Sessions) -> Result<(), AggregateError> {
        let clears = self.handlers.iter().map(|(name, handler)| async move {
            (name.clone(), handler.logout(sessions).await)
        });

        let mut failures = Vec::new();
        for (name, result) in future::join_all(clears).await {
            if let Err(error) = result {
                failures.push((name, error));
            }
        }
        AggregateError::from_failures(failures).map_or(Ok(()), Err)
    }

    fn named(&self, provider_name: String) -> Result<&ProviderHandler, FlowError> {
        self.handlers
            .get(&provider_name)
            .ok_or(FlowError::UnknownProvider(provider_name))
    }
}

async fn login(
    State(group): State<Arc<ProviderGroup>>,
    Path(provider): Path<String>,
    sessions: Sessions,
    Query(query): Query<LoginQuery>,
) -> Result<Response, FlowError> {
    group.named(provider)?.handle_login(&sessions, query).await
}

async fn callback(
    State(group): State<Arc<ProviderGroup>>,
    Path(provider): Path<String>,
    sessions: Sessions,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, FlowError> {
    group
        .named(provider)?
        .handle_callback(&sessions, query)
        .await
}

async fn logout(
    State(group): State<Arc<ProviderGroup>>,
    Path(provider): Path<String>,
    sessions: Sessions,
    Query(query): Query<LogoutQuery>,
) -> Result<Response, FlowError> {
    group.named(provider)?.handle_logout(&sessions, query).await
}

async fn logout_all(
    State(group): State<Arc<ProviderGroup>>,
    sessions: Sessions,
    Query(query): Query<LogoutQuery>,
) -> Result<Response, FlowError> {
    group.logout_all(&sessions).await?;
    let redirect_to = query
        .redirect_to
        .filter(|target| !target.is_empty())
        .unwrap_or_else(|| group.urls.default_logout_url.clone());
    Ok(Redirect::to(&redirect_to).into_response())
}

/// Middleware redirecting users with no credential from any provider
///
/// The group has no opinion on which provider a user should log in with, so
/// the caller supplies `login_redirect`, mapping the current request URI to
/// the login URL of their choosing (often a provider-picker page).
#[derive(Clone)]
pub struct GroupLoginRequired {
    group: Arc<ProviderGroup>,
    login_redirect: Arc<dyn Fn(&str) -> String + Send + Sync>,
}

impl GroupLoginRequired {
    /// Guard routes behind a login with any provider in the group
    pub fn new(
        group: Arc<ProviderGroup>,
        login_redirect: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            group,
            login_redirect: Arc::new(login_redirect),
        }
    }

    /// Run the guard: pass the request through when any provider holds a
    /// valid credential, redirect via `login_redirect` otherwise.
    pub async fn handle(self, request: Request, next: Next) -> Result<Response, FlowError> {
        let sessions = request
            .extensions()
            .get::<Sessions>()
            .cloned()
            .ok_or(FlowError::MissingSessionLayer)?;
        let (logged_in, error) = self.group.logged_in(&sessions).await;
        if let Some(error) = error {
            return Err(error.into());
        }
        if !logged_in {
            let target = (self.login_redirect)(&request.uri().to_string());
            return Ok(Redirect::to(&target).into_response());
        }
        Ok(next.run(request).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlowError;
    use crate::types::{AccessType, OAuthToken};

    struct NamedFlow(&'static str);

    #[async_trait::async_trait]
    impl AuthFlow for NamedFlow {
        fn name(&self) -> &str {
            self.0
        }

        fn authorization_url(&self, state: &str, _: AccessType, _: bool) -> String {
            format!("https://{}.test/authorize?state={state}", self.0)
        }

        async fn exchange_code(&self, _: &str, _: AccessType) -> Result<OAuthToken, FlowError> {
            Err(FlowError::Exchange("unreachable".to_string()))
        }
    }

    fn flows(names: &[&'static str]) -> Vec<Arc<dyn AuthFlow>> {
        names
            .iter()
            .map(|&name| Arc::new(NamedFlow(name)) as Arc<dyn AuthFlow>)
            .collect()
    }

    #[test]
    fn derives_namespaces_and_base_urls() {
        let group = ProviderGroup::new(
            "oauth",
            "/auth/",
            RedirectUrls::default(),
            flows(&["github", "google"]),
        )
        .unwrap();

        let github = group.handler("github").unwrap();
        assert_eq!(github.session_namespace(), "oauth-github");
        assert_eq!(github.base_url(), "/auth/github");
        assert_eq!(
            group.provider_names().collect::<Vec<_>>(),
            vec!["github", "google"]
        );
    }

    #[test]
    fn duplicate_provider_names_fail_construction() {
        let result = ProviderGroup::new(
            "oauth",
            "/auth",
            RedirectUrls::default(),
            flows(&["google", "google"]),
        );
        assert!(matches!(result, Err(FlowError::Config(_))));
    }

    #[test]
    fn empty_provider_name_fails_construction() {
        let result =
            ProviderGroup::new("oauth", "/auth", RedirectUrls::default(), flows(&[""]));
        assert!(matches!(result, Err(FlowError::Config(_))));
    }

    #[test]
    fn reserved_name_fails_construction() {
        let result =
            ProviderGroup::new("oauth", "/auth", RedirectUrls::default(), flows(&["all"]));
        assert!(matches!(result, Err(FlowError::Config(_))));
    }

    #[test]
    fn url_passthroughs_reject_unknown_providers() {
        let group = ProviderGroup::new(
            "oauth",
            "/auth",
            RedirectUrls::default(),
            flows(&["github"]),
        )
        .unwrap();

        assert_eq!(
            group.login_url("github", "/", false).unwrap(),
            "/auth/github/login?redirect_to=%2F&force_prompt=false"
        );
        assert!(matches!(
            group.login_url("myspace", "/", false),
            Err(FlowError::UnknownProvider(_))
        ));
        assert!(matches!(
            group.logout_url("myspace", "/"),
            Err(FlowError::UnknownProvider(_))
        ));
    }

    #[test]
    fn logout_all_url_covers_the_group() {
        let group = ProviderGroup::new(
            "oauth",
            "/auth",
            RedirectUrls::default(),
            flows(&["github"]),
        )
        .unwrap();
        assert_eq!(
            group.logout_all_url("/bye"),
            "/auth/all/logout?redirect_to=%2Fbye"
        );
    }
}
