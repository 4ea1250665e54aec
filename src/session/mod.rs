//! Session storage seam
//!
//! The flow engine keeps all mutable state in an external session store,
//! reached through the [`SessionStore`] trait. One store value represents a
//! single user's session bag; the host's session layer is responsible for
//! scoping it to the request (cookie lookup, persistence, transactionality)
//! and for inserting a [`Sessions`] handle into request extensions.
//!
//! Each provider handler owns one namespace inside the bag and stores a
//! typed [`AuthSession`] slice there, so a "present but wrong type" state
//! cannot occur.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::FlowError;
use crate::types::OAuthToken;

/// Per-namespace session slice for one provider
///
/// `state` and `redirect_to` exist only between "login initiated" and
/// "callback received"; `token` holds the credential after a completed flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    /// CSRF state token for the login round-trip in progress
    pub state: Option<String>,
    /// Where to send the user once the flow completes
    pub redirect_to: Option<String>,
    /// Credential from the last completed flow
    pub token: Option<OAuthToken>,
}

impl AuthSession {
    /// The stored token, if present and still valid.
    ///
    /// An expired token reads as absent; it is not removed here (reads are
    /// side-effect-free).
    #[must_use]
    pub fn valid_token(&self) -> Option<&OAuthToken> {
        self.token.as_ref().filter(|token| token.is_valid())
    }

    /// Whether a valid credential is stored
    #[must_use]
    pub fn logged_in(&self) -> bool {
        self.valid_token().is_some()
    }
}

/// Infrastructure failures from the session backend
#[derive(Debug, Error)]
pub enum SessionError {
    /// The backend failed to load a namespace
    #[error("failed to load session: {0}")]
    Load(String),

    /// The backend failed to persist a namespace
    #[error("failed to save session: {0}")]
    Save(String),

    /// The backend failed to clear a namespace
    #[error("failed to clear session: {0}")]
    Clear(String),
}

/// Backend holding one user's session bag, keyed by namespace
///
/// Implementations serialize [`AuthSession`] however they like (it is serde
/// round-trippable) and own their concurrency and persistence discipline.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a namespace's slice. A namespace never written before loads as
    /// [`AuthSession::default`].
    async fn load(&self, namespace: &str) -> Result<AuthSession, SessionError>;

    /// Persist a namespace's slice
    async fn save(&self, namespace: &str, session: &AuthSession) -> Result<(), SessionError>;

    /// Remove everything stored under a namespace
    async fn clear(&self, namespace: &str) -> Result<(), SessionError>;
}

/// Cloneable handle to the request's session store
///
/// The host inserts this into request extensions (typically with
/// `axum::Extension`); handlers and middleware extract it from there.
#[derive(Clone)]
pub struct Sessions(Arc<dyn SessionStore>);

impl Sessions {
    /// Wrap a store in a handle
    pub fn new(store: impl SessionStore + 'static) -> Self {
        Self(Arc::new(store))
    }

    /// Wrap an already-shared store
    #[must_use]
    pub fn from_arc(store: Arc<dyn SessionStore>) -> Self {
        Self(store)
    }

    /// Load a namespace's slice
    pub async fn load(&self, namespace: &str) -> Result<AuthSession, SessionError> {
        self.0.load(namespace).await
    }

    /// Persist a namespace's slice
    pub async fn save(&self, namespace: &str, session: &AuthSession) -> Result<(), SessionError> {
        self.0.save(namespace, session).await
    }

    /// Remove everything stored under a namespace
    pub async fn clear(&self, namespace: &str) -> Result<(), SessionError> {
        self.0.clear(namespace).await
    }
}

impl fmt::Debug for Sessions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sessions").finish_non_exhaustive()
    }
}

impl<S> FromRequestParts<S> for Sessions
where
    S: Send + Sync,
{
    type Rejection = FlowError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(FlowError::MissingSessionLayer)
    }
}

/// In-process session store for development and tests
///
/// Not suitable for production: state lives in this process only and is
/// shared by every request that carries the same handle.
#[derive(Debug, Default)]
pub struct MemoryStore {
    namespaces: RwLock<HashMap<String, AuthSession>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load(&self, namespace: &str) -> Result<AuthSession, SessionError> {
        Ok(self
            .namespaces
            .read()
            .get(namespace)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, namespace: &str, session: &AuthSession) -> Result<(), SessionError> {
        self.namespaces
            .write()
            .insert(namespace.to_string(), session.clone());
        Ok(())
    }

    async fn clear(&self, namespace: &str) -> Result<(), SessionError> {
        self.namespaces.write().remove(namespace);
        Ok(())
    }
}
