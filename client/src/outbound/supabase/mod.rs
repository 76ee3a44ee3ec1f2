//! Hosted backend adapters.
//!
//! This module provides thin HTTP implementations of the `RowGateway` and
//! `IdentityProvider` ports. Both adapters share one reqwest client and one
//! [`SessionStore`].

mod auth;
mod dto;
mod errors;
mod query_params;
mod rest;
mod session;

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Url};

pub use auth::GoTrueIdentityProvider;
pub use rest::PostgrestGateway;
pub use session::SessionStore;

const REST_PATH: &str = "rest/v1/";
const AUTH_PATH: &str = "auth/v1/";

/// Errors raised while wiring the adapters.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    /// The backend URL cannot carry API paths.
    #[error("backend URL {url} cannot be used as a base: {message}")]
    BaseUrl {
        /// Offending URL.
        url: String,
        /// Parser detail.
        message: String,
    },
}

/// Row gateway and identity provider bound to one backend project.
pub struct SupabaseConnection {
    /// Row API adapter.
    pub gateway: Arc<PostgrestGateway>,
    /// Auth API adapter.
    pub identity: Arc<GoTrueIdentityProvider>,
    /// Session shared by both adapters.
    pub session: Arc<SessionStore>,
}

impl SupabaseConnection {
    /// Build both adapters with an explicit request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed or the
    /// URL cannot serve as a base.
    pub fn connect(
        backend_url: &Url,
        api_key: &str,
        timeout: Duration,
        session: Arc<SessionStore>,
    ) -> Result<Self, ConnectError> {
        let client = Client::builder().timeout(timeout).build()?;
        let base = directory_url(backend_url);
        let rest_url = join_base(&base, REST_PATH)?;
        let auth_url = join_base(&base, AUTH_PATH)?;
        Ok(Self {
            gateway: Arc::new(PostgrestGateway::new(
                client.clone(),
                rest_url,
                api_key,
                Arc::clone(&session),
            )),
            identity: Arc::new(GoTrueIdentityProvider::new(
                client,
                auth_url,
                api_key,
                Arc::clone(&session),
            )),
            session,
        })
    }
}

/// Ensure the path ends in `/` so relative joins extend it.
fn directory_url(url: &Url) -> Url {
    let mut base = url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

fn join_base(base: &Url, path: &str) -> Result<Url, ConnectError> {
    if base.cannot_be_a_base() {
        return Err(ConnectError::BaseUrl {
            url: base.to_string(),
            message: "URL has no hierarchical path".to_owned(),
        });
    }
    base.join(path).map_err(|error| ConnectError::BaseUrl {
        url: base.to_string(),
        message: error.to_string(),
    })
}
