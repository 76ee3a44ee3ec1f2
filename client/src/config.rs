//! Client configuration loaded via OrthoConfig.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use url::Url;

use crate::domain::{DEFAULT_QUERY_RETRIES, PROFILE_STALE_TIME, QueryOptions};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Problems with the loaded settings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    /// A required value was not supplied by any layer.
    #[error("{field} is not configured; set CARPOOL_{env} or add it to the config file")]
    Missing {
        /// Settings field name.
        field: &'static str,
        /// Environment variable suffix.
        env: &'static str,
    },
    /// The backend URL did not parse.
    #[error("backend_url {value:?} is not a valid URL: {message}")]
    InvalidUrl {
        /// Raw value.
        value: String,
        /// Parser detail.
        message: String,
    },
}

/// Connection and caching settings for the carpool client.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "CARPOOL")]
pub struct ClientSettings {
    /// Base URL of the hosted backend project.
    pub backend_url: Option<String>,
    /// Public API key sent with every request.
    pub api_key: Option<String>,
    /// Previously issued access token to resume a session with.
    pub access_token: Option<String>,
    /// Freshness window of the cached profile, in seconds.
    pub stale_time_secs: Option<u64>,
    /// Retries after a failed query fetch.
    pub query_retries: Option<u32>,
    /// HTTP request timeout, in seconds.
    pub request_timeout_secs: Option<u64>,
}

impl ClientSettings {
    /// Parsed backend URL.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Missing`] when unset or blank and
    /// [`SettingsError::InvalidUrl`] when it does not parse.
    pub fn backend_url(&self) -> Result<Url, SettingsError> {
        let raw = required(self.backend_url.as_deref(), "backend_url", "BACKEND_URL")?;
        Url::parse(raw).map_err(|error| SettingsError::InvalidUrl {
            value: raw.to_owned(),
            message: error.to_string(),
        })
    }

    /// Public API key.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Missing`] when unset or blank.
    pub fn api_key(&self) -> Result<&str, SettingsError> {
        required(self.api_key.as_deref(), "api_key", "API_KEY")
    }

    /// Stored access token, when one was configured.
    pub fn access_token(&self) -> Option<&str> {
        self.access_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    /// Fetch policy for the ride queries: always stale.
    pub fn ride_query_options(&self) -> QueryOptions {
        QueryOptions::default().with_retry(self.query_retries())
    }

    /// Fetch policy for the profile query.
    pub fn profile_query_options(&self) -> QueryOptions {
        let stale_time = self
            .stale_time_secs
            .map_or(PROFILE_STALE_TIME, Duration::from_secs);
        QueryOptions::default()
            .with_stale_time(stale_time)
            .with_retry(self.query_retries())
    }

    /// Retries after a failed fetch, defaulting to two.
    pub fn query_retries(&self) -> u32 {
        self.query_retries.unwrap_or(DEFAULT_QUERY_RETRIES)
    }

    /// HTTP request timeout, defaulting to thirty seconds.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout_secs
            .filter(|secs| *secs > 0)
            .map_or(DEFAULT_REQUEST_TIMEOUT, Duration::from_secs)
    }
}

fn required<'a>(
    value: Option<&'a str>,
    field: &'static str,
    env: &'static str,
) -> Result<&'a str, SettingsError> {
    value
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or(SettingsError::Missing { field, env })
}

#[cfg(test)]
mod tests {
    //! Unit tests for client configuration parsing.

    use super::*;
    use std::ffi::OsString;

    use env_lock::lock_env;
    use rstest::rstest;

    const VARS: [&str; 6] = [
        "CARPOOL_BACKEND_URL",
        "CARPOOL_API_KEY",
        "CARPOOL_ACCESS_TOKEN",
        "CARPOOL_STALE_TIME_SECS",
        "CARPOOL_QUERY_RETRIES",
        "CARPOOL_REQUEST_TIMEOUT_SECS",
    ];

    fn load_from_empty_args() -> ClientSettings {
        ClientSettings::load_from_iter([OsString::from("carpool")]).expect("config should load")
    }

    #[rstest]
    fn default_values_are_used_when_missing() {
        let _guard = lock_env(VARS.map(|name| (name, None::<String>)));

        let settings = load_from_empty_args();
        assert_eq!(
            settings.backend_url(),
            Err(SettingsError::Missing {
                field: "backend_url",
                env: "BACKEND_URL",
            })
        );
        assert!(settings.api_key().is_err());
        assert!(settings.access_token().is_none());
        assert_eq!(settings.query_retries(), 2);
        assert_eq!(settings.request_timeout(), Duration::from_secs(30));
        assert_eq!(
            settings.profile_query_options().stale_time,
            Duration::from_secs(300)
        );
        assert_eq!(settings.ride_query_options().stale_time, Duration::ZERO);
    }

    #[rstest]
    fn environment_overrides_are_respected() {
        let _guard = lock_env([
            ("CARPOOL_BACKEND_URL", Some("https://demo.supabase.co".to_owned())),
            ("CARPOOL_API_KEY", Some("anon-key".to_owned())),
            ("CARPOOL_ACCESS_TOKEN", Some("token".to_owned())),
            ("CARPOOL_STALE_TIME_SECS", Some("60".to_owned())),
            ("CARPOOL_QUERY_RETRIES", Some("0".to_owned())),
            ("CARPOOL_REQUEST_TIMEOUT_SECS", Some("5".to_owned())),
        ]);

        let settings = load_from_empty_args();
        assert_eq!(
            settings.backend_url().expect("url").as_str(),
            "https://demo.supabase.co/"
        );
        assert_eq!(settings.api_key(), Ok("anon-key"));
        assert_eq!(settings.access_token(), Some("token"));
        assert_eq!(settings.request_timeout(), Duration::from_secs(5));
        let profile = settings.profile_query_options();
        assert_eq!(profile.stale_time, Duration::from_secs(60));
        assert_eq!(profile.retry, 0);
        assert_eq!(settings.ride_query_options().retry, 0);
    }

    #[rstest]
    #[case::not_a_url("not a url")]
    #[case::relative("/rest/v1")]
    fn invalid_backend_urls_are_reported(#[case] raw: &str) {
        let settings = ClientSettings {
            backend_url: Some(raw.to_owned()),
            api_key: None,
            access_token: None,
            stale_time_secs: None,
            query_retries: None,
            request_timeout_secs: None,
        };
        assert!(matches!(
            settings.backend_url(),
            Err(SettingsError::InvalidUrl { .. })
        ));
    }

    #[rstest]
    fn blank_values_count_as_missing() {
        let settings = ClientSettings {
            backend_url: Some("  ".to_owned()),
            api_key: Some(String::new()),
            access_token: Some(" ".to_owned()),
            stale_time_secs: None,
            query_retries: None,
            request_timeout_secs: Some(0),
        };
        assert!(matches!(
            settings.backend_url(),
            Err(SettingsError::Missing { .. })
        ));
        assert!(settings.api_key().is_err());
        assert!(settings.access_token().is_none());
        assert_eq!(settings.request_timeout(), Duration::from_secs(30));
    }
}
