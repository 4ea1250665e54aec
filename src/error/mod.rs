//! Error types and error-to-response translation
//!
//! Failures are classified so the host can alert on infrastructure problems
//! separately from rejected client input: configuration errors are fatal at
//! startup, client-input rejections render as 400, upstream exchange
//! failures as 502, session-backend failures as 500.

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::session::SessionError;

/// Flow engine error type
#[derive(Debug, Error)]
pub enum FlowError {
    /// Invalid provider or group configuration, detected at construction
    #[error("configuration error: {0}")]
    Config(String),

    /// Callback received with no login in progress for this session
    #[error("no login in progress for this session")]
    MissingLoginState,

    /// Callback received but the session has no post-login redirect target
    #[error("no post-login redirect target in this session")]
    MissingRedirectTarget,

    /// Callback state does not match the state this server issued
    #[error("csrf detected")]
    CsrfDetected,

    /// Authorization-code-for-token exchange failed upstream
    #[error("token exchange failed: {0}")]
    Exchange(String),

    /// Session backend failure
    #[error(transparent)]
    Session(#[from] SessionError),

    /// No [`crate::session::Sessions`] handle in request extensions
    #[error("session layer not installed")]
    MissingSessionLayer,

    /// Request named a provider the group does not know
    #[error("unknown provider {0:?}")]
    UnknownProvider(String),

    /// One or more providers failed during a group fan-out
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

impl FlowError {
    /// HTTP status this error renders as
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MissingLoginState | Self::MissingRedirectTarget | Self::CsrfDetected => {
                StatusCode::BAD_REQUEST
            }
            Self::UnknownProvider(_) => StatusCode::NOT_FOUND,
            Self::Exchange(_) => StatusCode::BAD_GATEWAY,
            Self::Config(_)
            | Self::Session(_)
            | Self::MissingSessionLayer
            | Self::Aggregate(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for FlowError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "oauth2 flow failed");
        } else {
            tracing::debug!(error = %self, "oauth2 flow rejected request");
        }
        (status, self.to_string()).into_response()
    }
}

/// Combined failure from a best-effort group fan-out
///
/// Holds one `(provider, error)` pair per failed provider. An aggregate with
/// no failures is never constructed; "no error" is `None` at the call sites,
/// never an empty sentinel.
#[derive(Debug)]
pub struct AggregateError {
    failures: Vec<(String, FlowError)>,
}

impl AggregateError {
    /// Build an aggregate from collected failures, or `None` if there were
    /// none.
    #[must_use]
    pub fn from_failures(failures: Vec<(String, FlowError)>) -> Option<Self> {
        if failures.is_empty() {
            None
        } else {
            Some(Self { failures })
        }
    }

    /// The individual `(provider, error)` failures
    #[must_use]
    pub fn failures(&self) -> &[(String, FlowError)] {
        &self.failures
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} provider operation(s) failed:", self.failures.len())?;
        for (name, error) in &self.failures {
            write!(f, " {name}: {error};")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}
