//! Reqwest-backed identity adapter for the hosted auth service.
//!
//! Sign-in exchanges a third-party ID token for a session; the access token
//! is kept in the shared [`SessionStore`] so the row gateway can act on
//! behalf of the signed-in user.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, info};

use super::SessionStore;
use super::dto::{AuthUserDto, IdTokenGrantDto, SessionDto};
use super::errors::{map_auth_status, map_transport_error};
use crate::domain::Identity;
use crate::domain::ports::{GatewayError, IdentityProvider};

/// Identity provider backed by the auth API.
pub struct GoTrueIdentityProvider {
    client: Client,
    auth_url: Url,
    api_key: String,
    session: Arc<SessionStore>,
}

impl GoTrueIdentityProvider {
    /// Build a provider rooted at `auth_url` (e.g. `https://host/auth/v1/`).
    pub fn new(
        client: Client,
        auth_url: Url,
        api_key: impl Into<String>,
        session: Arc<SessionStore>,
    ) -> Self {
        Self {
            client,
            auth_url,
            api_key: api_key.into(),
            session,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        self.auth_url.join(path).map_err(|error| {
            GatewayError::transport(format!("invalid auth URL for {path}: {error}"))
        })
    }

    /// Exchange an ID token from `provider` (e.g. `google`) for a session.
    ///
    /// # Errors
    ///
    /// Returns the mapped gateway error when the exchange is refused or the
    /// service cannot be reached.
    pub async fn sign_in_with_id_token(
        &self,
        provider: &str,
        id_token: &str,
    ) -> Result<Identity, GatewayError> {
        let mut url = self.endpoint("token")?;
        url.query_pairs_mut().append_pair("grant_type", "id_token");
        let response = self
            .client
            .post(url)
            .header("apikey", self.api_key.as_str())
            .json(&IdTokenGrantDto { provider, id_token })
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_auth_status(status, body.as_ref()));
        }

        let session: SessionDto = serde_json::from_slice(body.as_ref())
            .map_err(|error| GatewayError::decode(format!("invalid session payload: {error}")))?;
        let identity = session
            .user
            .into_identity()
            .map_err(GatewayError::decode)?;
        self.session.replace(session.access_token);
        info!(user_id = %identity.id, provider, "signed in");
        Ok(identity)
    }

    /// Forget the local session.
    pub fn sign_out(&self) {
        self.session.clear();
        info!("signed out");
    }
}

#[async_trait]
impl IdentityProvider for GoTrueIdentityProvider {
    async fn current_identity(&self) -> Result<Option<Identity>, GatewayError> {
        let Some(token) = self.session.access_token() else {
            return Ok(None);
        };
        let response = self
            .client
            .get(self.endpoint("user")?)
            .header("apikey", self.api_key.as_str())
            .bearer_auth(token.as_str())
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        if session_rejected(status) {
            debug!(status = status.as_u16(), "access token rejected; clearing session");
            self.session.clear();
            return Ok(None);
        }
        if !status.is_success() {
            return Err(map_auth_status(status, body.as_ref()));
        }

        let user: AuthUserDto = serde_json::from_slice(body.as_ref())
            .map_err(|error| GatewayError::decode(format!("invalid user payload: {error}")))?;
        user.into_identity().map(Some).map_err(GatewayError::decode)
    }
}

/// Statuses meaning the stored token no longer identifies anyone.
fn session_rejected(status: StatusCode) -> bool {
    matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn provider(session: Arc<SessionStore>) -> GoTrueIdentityProvider {
        GoTrueIdentityProvider::new(
            Client::new(),
            Url::parse("https://demo.supabase.co/auth/v1/").expect("url"),
            "anon",
            session,
        )
    }

    #[rstest]
    #[case::unauthorized(StatusCode::UNAUTHORIZED, true)]
    #[case::forbidden(StatusCode::FORBIDDEN, true)]
    #[case::server_error(StatusCode::INTERNAL_SERVER_ERROR, false)]
    #[case::ok(StatusCode::OK, false)]
    fn only_auth_statuses_end_the_session(#[case] status: StatusCode, #[case] expected: bool) {
        assert_eq!(session_rejected(status), expected);
    }

    #[rstest]
    #[tokio::test]
    async fn signed_out_sessions_have_no_identity_without_a_request() {
        let provider = provider(Arc::new(SessionStore::new()));
        let identity = provider.current_identity().await.expect("no request made");
        assert!(identity.is_none());
    }

    #[rstest]
    fn sign_out_clears_the_shared_session() {
        let session = Arc::new(SessionStore::with_access_token("token"));
        let provider = provider(Arc::clone(&session));

        provider.sign_out();

        assert!(!session.is_signed_in());
    }

    #[rstest]
    fn endpoints_extend_the_auth_root() {
        let provider = provider(Arc::new(SessionStore::new()));
        assert_eq!(
            provider.endpoint("user").expect("url").as_str(),
            "https://demo.supabase.co/auth/v1/user"
        );
    }

    #[rstest]
    fn decodes_user_payloads_into_identities() {
        let user: AuthUserDto =
            serde_json::from_str(r#"{"id":"u1","email":"asha@example.com","aud":"authenticated"}"#)
                .expect("user payload");
        let identity = user.into_identity().expect("identity");
        assert_eq!(identity.id.as_str(), "u1");
        assert_eq!(identity.email.as_deref(), Some("asha@example.com"));
    }
}
