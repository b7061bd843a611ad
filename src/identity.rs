//! Authenticated user identity
//!
//! The login flow (out of scope here) leaves an `auth` cookie holding the
//! base64-encoded JSON of an `Identity`. The room only needs the display
//! name and whatever the avatar resolvers look at.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::IdentityError;

/// Name of the cookie carrying the identity
pub const AUTH_COOKIE: &str = "auth";

/// An authenticated chat user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Display name shown on every message
    pub name: String,
    /// Stable opaque user id (hex digest issued at login)
    #[serde(default, rename = "userid")]
    pub user_id: String,
    /// Avatar URL supplied by the auth provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// E-mail address, if the provider shared it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Identity {
    /// Create an identity with only a display name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            user_id: String::new(),
            avatar_url: None,
            email: None,
        }
    }

    /// Set the user id
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Set the provider avatar URL
    pub fn with_avatar_url(mut self, avatar_url: impl Into<String>) -> Self {
        self.avatar_url = Some(avatar_url.into());
        self
    }

    /// Decode an `auth` cookie value
    pub fn from_cookie_value(value: &str) -> Result<Self, IdentityError> {
        let bytes = STANDARD.decode(value.trim())?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Encode as an `auth` cookie value
    pub fn to_cookie_value(&self) -> Result<String, IdentityError> {
        Ok(STANDARD.encode(serde_json::to_vec(self)?))
    }

    /// Pull the identity out of a `Cookie` header value
    pub fn from_cookie_header(header: &str) -> Result<Self, IdentityError> {
        let value = header
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == AUTH_COOKIE)
            .map(|(_, value)| value)
            .ok_or(IdentityError::MissingCookie)?;
        Self::from_cookie_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_value_round_trip() {
        let identity = Identity::new("Alice")
            .with_user_id("0bc83cb571cd1c50ba6f3e8a78ef1346")
            .with_avatar_url("https://example.com/alice.png");
        let value = identity.to_cookie_value().unwrap();
        assert_eq!(Identity::from_cookie_value(&value).unwrap(), identity);
    }

    #[test]
    fn test_cookie_header_lookup() {
        let value = Identity::new("Bob").to_cookie_value().unwrap();
        let header = format!("theme=dark; auth={value}; lang=en");
        let identity = Identity::from_cookie_header(&header).unwrap();
        assert_eq!(identity.name, "Bob");
        assert!(identity.user_id.is_empty());
        assert!(identity.avatar_url.is_none());
    }

    #[test]
    fn test_missing_cookie() {
        assert!(matches!(
            Identity::from_cookie_header("theme=dark"),
            Err(IdentityError::MissingCookie)
        ));
    }

    #[test]
    fn test_bad_cookie_encoding() {
        assert!(matches!(
            Identity::from_cookie_value("%%%"),
            Err(IdentityError::Base64(_))
        ));
    }

    #[test]
    fn test_bad_cookie_payload() {
        let value = STANDARD.encode(b"{\"nope\": true}");
        assert!(matches!(
            Identity::from_cookie_value(&value),
            Err(IdentityError::Json(_))
        ));
    }
}
