//! Multi-provider group: per-provider routing, aggregation, logout-all

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::{Extension, Router};
use oauth2_mux::group::{GroupLoginRequired, ProviderGroup};
use oauth2_mux::session::{AuthSession, MemoryStore, SessionError, SessionStore, Sessions};
use oauth2_mux::types::RedirectUrls;
use tower::ServiceExt;

use common::{location, FakeFlow};

/// Store that fails every operation on the configured namespaces, as a
/// broken backend shard would.
struct FlakyStore {
    inner: MemoryStore,
    broken: HashSet<String>,
}

impl FlakyStore {
    fn failing(namespaces: &[&str]) -> Self {
        Self {
            inner: MemoryStore::new(),
            broken: namespaces.iter().map(|ns| (*ns).to_string()).collect(),
        }
    }

    fn check(&self, namespace: &str) -> Result<(), String> {
        if self.broken.contains(namespace) {
            Err(format!("backend shard for {namespace} is down"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SessionStore for FlakyStore {
    async fn load(&self, namespace: &str) -> Result<AuthSession, SessionError> {
        self.check(namespace).map_err(SessionError::Load)?;
        self.inner.load(namespace).await
    }

    async fn save(&self, namespace: &str, session: &AuthSession) -> Result<(), SessionError> {
        self.check(namespace).map_err(SessionError::Save)?;
        self.inner.save(namespace, session).await
    }

    async fn clear(&self, namespace: &str) -> Result<(), SessionError> {
        self.check(namespace).map_err(SessionError::Clear)?;
        self.inner.clear(namespace).await
    }
}

fn two_provider_group() -> Arc<ProviderGroup> {
    Arc::new(
        ProviderGroup::new(
            "oauth",
            "/auth",
            RedirectUrls::default(),
            vec![FakeFlow::shared("github"), FakeFlow::shared("google")],
        )
        .unwrap(),
    )
}

fn app_for(group: &Arc<ProviderGroup>, sessions: &Sessions) -> Router {
    Router::new()
        .nest("/auth", Arc::clone(group).router())
        .layer(Extension(sessions.clone()))
}

async fn send(app: &Router, uri: &str) -> axum::response::Response {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn log_in(app: &Router, sessions: &Sessions, provider: &str, code: &str) {
    send(app, &format!("/auth/{provider}/login")).await;
    let state = sessions
        .load(&format!("oauth-{provider}"))
        .await
        .unwrap()
        .state
        .unwrap();
    let response = send(
        app,
        &format!("/auth/{provider}/_cb?state={state}&code={code}"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn demo_walkthrough() {
    // Provider "demo", default login URL "/": GET /auth/demo/login with no
    // parameters stores a state and redirects to the authorization
    // endpoint; the provider calls back with that state and code ABC; the
    // session then holds a credential and the user lands on "/".
    let group = Arc::new(
        ProviderGroup::new(
            "oauth",
            "/auth",
            RedirectUrls::default(),
            vec![FakeFlow::shared("demo")],
        )
        .unwrap(),
    );
    let sessions = Sessions::new(MemoryStore::new());
    let app = app_for(&group, &sessions);

    let response = send(&app, "/auth/demo/login").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let session = sessions.load("oauth-demo").await.unwrap();
    let state = session.state.unwrap();
    assert_eq!(session.redirect_to.as_deref(), Some("/"));
    assert!(location(&response).contains(&format!("state={state}")));

    let response = send(&app, &format!("/auth/demo/_cb?state={state}&code=ABC")).await;
    assert_eq!(location(&response), "/");
    let token = group
        .handler("demo")
        .unwrap()
        .token(&sessions)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(token.access_token, "demo-token-ABC");
}

#[tokio::test]
async fn tokens_reports_only_logged_in_providers() {
    let group = two_provider_group();
    let sessions = Sessions::new(MemoryStore::new());
    let app = app_for(&group, &sessions);

    log_in(&app, &sessions, "github", "GH1").await;

    let (tokens, error) = group.tokens(&sessions).await;
    assert!(error.is_none());
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens["github"].access_token, "github-token-GH1");
    assert!(!tokens.contains_key("google"));

    let (logged_in, _) = group.logged_in(&sessions).await;
    assert!(logged_in);
}

#[tokio::test]
async fn logout_all_clears_every_provider() {
    let group = two_provider_group();
    let sessions = Sessions::new(MemoryStore::new());
    let app = app_for(&group, &sessions);

    log_in(&app, &sessions, "github", "GH1").await;
    log_in(&app, &sessions, "google", "GO1").await;
    let (tokens, _) = group.tokens(&sessions).await;
    assert_eq!(tokens.len(), 2);

    let response = send(&app, "/auth/all/logout?redirect_to=/bye").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/bye");

    let (tokens, error) = group.tokens(&sessions).await;
    assert!(tokens.is_empty());
    assert!(error.is_none());
    let (logged_in, _) = group.logged_in(&sessions).await;
    assert!(!logged_in);
}

#[tokio::test]
async fn unknown_provider_paths_are_not_found() {
    let group = two_provider_group();
    let sessions = Sessions::new(MemoryStore::new());
    let app = app_for(&group, &sessions);

    let response = send(&app, "/auth/myspace/login").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, "/auth/myspace/_cb?state=s&code=c").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn one_broken_backend_does_not_hide_the_other_tokens() {
    let group = two_provider_group();
    let sessions = Sessions::new(FlakyStore::failing(&["oauth-google"]));
    let app = app_for(&group, &sessions);

    log_in(&app, &sessions, "github", "GH1").await;

    let (tokens, error) = group.tokens(&sessions).await;
    assert_eq!(tokens.len(), 1);
    assert!(tokens.contains_key("github"));

    let error = error.expect("google lookup failed");
    assert_eq!(error.failures().len(), 1);
    assert_eq!(error.failures()[0].0, "google");
    assert!(error.to_string().contains("oauth-google"));
}

#[tokio::test]
async fn logout_all_clears_what_it_can_and_reports_the_rest() {
    let group = two_provider_group();
    let sessions = Sessions::new(FlakyStore::failing(&["oauth-google"]));
    let app = app_for(&group, &sessions);

    log_in(&app, &sessions, "github", "GH1").await;

    let error = group.logout_all(&sessions).await.unwrap_err();
    assert_eq!(error.failures().len(), 1);
    assert_eq!(error.failures()[0].0, "google");

    // The healthy provider's namespace was still cleared.
    assert_eq!(
        sessions.load("oauth-github").await.unwrap(),
        AuthSession::default()
    );
}

#[tokio::test]
async fn group_login_required_uses_the_caller_chosen_redirect() {
    let group = two_provider_group();
    let sessions = Sessions::new(MemoryStore::new());
    let auth = app_for(&group, &sessions);

    let guard = GroupLoginRequired::new(Arc::clone(&group), |uri| format!("/pick?next={uri}"));
    let app = Router::new()
        .route("/app", get(|| async { "protected" }))
        .layer(axum::middleware::from_fn(move |req, next| {
            guard.clone().handle(req, next)
        }))
        .layer(Extension(sessions.clone()));

    let response = send(&app, "/app").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/pick?next=/app");

    log_in(&auth, &sessions, "google", "GO1").await;
    let response = send(&app, "/app").await;
    assert_eq!(response.status(), StatusCode::OK);
}
