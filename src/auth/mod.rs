//! Caller identity.
//!
//! - `IdentityResolver` turns a bearer credential into a `Principal`
//! - `JwksResolver` verifies JWTs against an issuer's published key set
//! - `ServiceToken` gates the administrative surface

mod jwks;
mod service;

pub use jwks::{JwksConfig, JwksResolver};
pub use service::ServiceToken;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Resolved identity of an authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolves bearer credentials to principals.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, credential: &str) -> Result<Principal, AuthError>;
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(bearer_token("bearer  abc "), Some("abc"));
        assert_eq!(bearer_token("Basic dXNlcg=="), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Bearer"), None);
    }

    #[test]
    fn test_principal_serializes_as_string() {
        let p = Principal::new("user_2abc");
        assert_eq!(serde_json::to_string(&p).unwrap(), "\"user_2abc\"");
        assert_eq!(p.to_string(), "user_2abc");
    }
}
