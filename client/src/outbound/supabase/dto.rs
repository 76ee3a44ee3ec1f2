//! Wire DTOs for the row and auth APIs.

use serde::{Deserialize, Serialize};

use crate::domain::{Identity, UserId};

/// Error body returned by the row API.
#[derive(Debug, Deserialize)]
pub(super) struct PostgrestErrorDto {
    #[serde(default)]
    pub(super) code: Option<String>,
    pub(super) message: String,
}

/// Error body returned by the auth API. Older and newer deployments use
/// different field names, so everything is optional.
#[derive(Debug, Default, Deserialize)]
pub(super) struct AuthErrorDto {
    #[serde(default)]
    pub(super) error_code: Option<String>,
    #[serde(default)]
    pub(super) error: Option<String>,
    #[serde(default)]
    pub(super) error_description: Option<String>,
    #[serde(default)]
    pub(super) msg: Option<String>,
    #[serde(default)]
    pub(super) message: Option<String>,
}

impl AuthErrorDto {
    pub(super) fn code(&self) -> Option<&str> {
        self.error_code.as_deref().or(self.error.as_deref())
    }

    pub(super) fn message(&self) -> Option<&str> {
        self.msg
            .as_deref()
            .or(self.message.as_deref())
            .or(self.error_description.as_deref())
    }
}

/// Body of the ID-token grant.
#[derive(Debug, Serialize)]
pub(super) struct IdTokenGrantDto<'a> {
    pub(super) provider: &'a str,
    pub(super) id_token: &'a str,
}

/// Session issued by the token endpoint.
#[derive(Debug, Deserialize)]
pub(super) struct SessionDto {
    pub(super) access_token: String,
    pub(super) user: AuthUserDto,
}

/// User object returned by the auth API.
#[derive(Debug, Deserialize)]
pub(super) struct AuthUserDto {
    pub(super) id: String,
    #[serde(default)]
    pub(super) email: Option<String>,
}

impl AuthUserDto {
    pub(super) fn into_identity(self) -> Result<Identity, String> {
        let id = UserId::new(self.id).map_err(|err| err.to_string())?;
        let identity = Identity::new(id);
        Ok(match self.email.filter(|email| !email.is_empty()) {
            Some(email) => identity.with_email(email),
            None => identity,
        })
    }
}
