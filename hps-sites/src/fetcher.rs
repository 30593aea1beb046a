//! The calling contract shared by every indicator source.
//!
//! A fetcher turns one location into one scalar value. It never fails the
//! caller: network errors, bad statuses, expired tokens and empty results
//! all come back as a [`FetchFailure`]. Credentials are an explicit value
//! handed to each call; refreshing produces a new [`Credentials`] rather
//! than mutating shared state.

use crate::{
    error::{Result, SiteError},
    indicator::Indicator,
    location::LocationRecord,
};
use std::fmt;

/// Why a fetch produced no value.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchFailure {
    /// Connection error or timeout
    Network(String),
    /// Non-success HTTP status other than 401
    Status(u16),
    /// The bearer token was rejected (HTTP 401)
    AuthExpired,
    /// The computation succeeded but yielded no usable samples
    NoValidData,
    /// The response body could not be interpreted
    InvalidResponse(String),
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::Network(e) => write!(f, "network error: {}", e),
            FetchFailure::Status(code) => write!(f, "unexpected status {}", code),
            FetchFailure::AuthExpired => f.write_str("access token expired"),
            FetchFailure::NoValidData => f.write_str("no valid samples"),
            FetchFailure::InvalidResponse(e) => write!(f, "invalid response: {}", e),
        }
    }
}

pub type FetchOutcome = std::result::Result<f64, FetchFailure>;

/// Bearer credentials for an authenticated service.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Credentials {
    access_token: String,
    refresh_token: Option<String>,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Credentials {
            access_token: access_token.into(),
            refresh_token,
        }
    }

    /// Credentials for services that need none.
    pub fn anonymous() -> Self {
        Credentials::default()
    }

    pub fn is_anonymous(&self) -> bool {
        self.access_token.is_empty()
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// Value for an `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &if self.is_anonymous() { "" } else { "<redacted>" })
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Computes one indicator for one location.
#[allow(async_fn_in_trait)]
pub trait IndicatorFetcher {
    fn indicator(&self) -> Indicator;

    async fn fetch(&self, location: &LocationRecord, credentials: &Credentials) -> FetchOutcome;
}

/// Issues fresh credentials when the current ones expire.
#[allow(async_fn_in_trait)]
pub trait Authenticator {
    async fn refresh(&self, current: &Credentials) -> Result<Credentials>;
}

/// Authenticator for services without credentials; refreshing always fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl Authenticator for Anonymous {
    async fn refresh(&self, _current: &Credentials) -> Result<Credentials> {
        Err(SiteError::Authentication(
            "no credential source configured".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_debug_redacts_tokens() {
        let credentials = Credentials::new("secret-access", Some("secret-refresh".to_string()));
        let debug = format!("{:?}", credentials);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<redacted>"));
        assert_eq!(credentials.bearer(), "Bearer secret-access");
        assert_eq!(credentials.refresh_token(), Some("secret-refresh"));
    }

    #[test]
    fn test_anonymous_credentials() {
        let credentials = Credentials::anonymous();
        assert!(credentials.is_anonymous());
        assert_eq!(credentials.refresh_token(), None);
    }

    #[tokio::test]
    async fn test_anonymous_refresh_fails() {
        let result = Anonymous.refresh(&Credentials::anonymous()).await;
        assert!(matches!(result, Err(SiteError::Authentication(_))));
    }

    #[test]
    fn test_failure_display() {
        assert_eq!(FetchFailure::Status(503).to_string(), "unexpected status 503");
        assert_eq!(FetchFailure::AuthExpired.to_string(), "access token expired");
    }
}
