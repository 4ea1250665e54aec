//! oauth2-mux: multi-provider OAuth2 login middleware for axum
//!
//! This crate drives the client side of the OAuth2 authorization-code flow:
//! redirect-to-provider, callback verification with CSRF protection, and
//! token acquisition, binding the resulting credential to a server-side
//! session. A [`handler::ProviderHandler`] runs the flow for one provider;
//! a [`group::ProviderGroup`] composes several under one base URL and adds
//! cross-provider operations (aggregate token lookup, logout-all, a
//! combined login gate).
//!
//! The session store and the host's HTTP stack are collaborators, not part
//! of this crate: the host mounts the routers this crate builds and inserts
//! a [`session::Sessions`] handle into request extensions (the bundled
//! [`session::MemoryStore`] covers development and tests).
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use oauth2_mux::config::GroupSettings;
//! use oauth2_mux::group::ProviderGroup;
//! use oauth2_mux::session::{MemoryStore, Sessions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     oauth2_mux::observability::init()?;
//!
//!     let settings = GroupSettings::load()?;
//!     let group = Arc::new(ProviderGroup::from_settings(&settings)?);
//!
//!     let sessions = Sessions::new(MemoryStore::new());
//!     let app = axum::Router::new()
//!         .nest(group.base_url(), Arc::clone(&group).router())
//!         .layer(axum::Extension(sessions));
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod group;
pub mod handler;
pub mod observability;
pub mod provider;
pub mod session;
pub mod types;

pub mod prelude {
    //! Convenience re-exports for common types and traits

    pub use crate::config::{GroupSettings, ProviderSettings};
    pub use crate::error::{AggregateError, FlowError};
    pub use crate::group::{GroupLoginRequired, ProviderGroup};
    pub use crate::handler::{LoginRequired, ProviderHandler};
    pub use crate::provider::{AuthFlow, Provider};
    pub use crate::session::{AuthSession, MemoryStore, SessionError, SessionStore, Sessions};
    pub use crate::types::{AccessType, OAuthToken, RedirectUrls};
}
