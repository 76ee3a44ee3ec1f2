//! Port resolving the identity behind the current session.

use async_trait::async_trait;

use crate::domain::Identity;

use super::GatewayError;

/// Port for the authentication service.
///
/// Returns `Ok(None)` when no session exists or the backend no longer accepts
/// it. Errors are reserved for transport and decoding failures.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Identity of the signed-in user, if any.
    async fn current_identity(&self) -> Result<Option<Identity>, GatewayError>;
}

/// Fixture provider with nobody signed in.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureIdentityProvider;

#[async_trait]
impl IdentityProvider for FixtureIdentityProvider {
    async fn current_identity(&self) -> Result<Option<Identity>, GatewayError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixture_provider_is_signed_out() {
        let identity = FixtureIdentityProvider
            .current_identity()
            .await
            .expect("fixture lookup succeeds");
        assert!(identity.is_none());
    }
}
