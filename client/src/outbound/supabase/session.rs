//! Shared session state for the hosted backend adapters.

use std::fmt;
use std::sync::{PoisonError, RwLock};

use zeroize::Zeroizing;

/// Holds the access token issued by the auth service.
///
/// The token is wiped from memory when replaced, cleared or dropped.
#[derive(Default)]
pub struct SessionStore {
    access_token: RwLock<Option<Zeroizing<String>>>,
}

impl SessionStore {
    /// Empty store: requests fall back to the anonymous API key.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with a previously issued access token.
    pub fn with_access_token(token: impl Into<String>) -> Self {
        let store = Self::new();
        store.replace(token);
        store
    }

    /// Install a new access token.
    pub fn replace(&self, token: impl Into<String>) {
        let mut slot = self
            .access_token
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Zeroizing::new(token.into()));
    }

    /// Forget the access token.
    pub fn clear(&self) {
        let mut slot = self
            .access_token
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = None;
    }

    /// Copy of the current access token.
    pub fn access_token(&self) -> Option<Zeroizing<String>> {
        self.access_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a session is active.
    pub fn is_signed_in(&self) -> bool {
        self.access_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Bearer credential for row requests: the access token, or the API key
    /// for anonymous access.
    pub(super) fn bearer(&self, api_key: &str) -> Zeroizing<String> {
        self.access_token()
            .unwrap_or_else(|| Zeroizing::new(api_key.to_owned()))
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("signed_in", &self.is_signed_in())
            .finish()
    }
}
