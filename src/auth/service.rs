//! Service credential for privileged callers (execution backend, operators).

use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

/// Shared secret presented by trusted services. Never logged.
#[derive(Clone)]
pub struct ServiceToken {
    token: Option<SecretString>,
}

impl ServiceToken {
    pub fn new(token: Option<SecretString>) -> Self {
        Self { token }
    }

    /// A token that accepts nothing.
    pub fn disabled() -> Self {
        Self { token: None }
    }

    pub fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    /// Constant-time check of a presented token.
    pub fn verify(&self, presented: &str) -> bool {
        self.token
            .as_ref()
            .map(|stored| {
                stored
                    .expose_secret()
                    .as_bytes()
                    .ct_eq(presented.as_bytes())
                    .into()
            })
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for ServiceToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceToken")
            .field("configured", &self.is_configured())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify() {
        let token = ServiceToken::new(Some(SecretString::from("s3cret-token")));
        assert!(token.verify("s3cret-token"));
        assert!(!token.verify("s3cret-tokeN"));
        assert!(!token.verify(""));
    }

    #[test]
    fn test_disabled_rejects_everything() {
        let token = ServiceToken::disabled();
        assert!(!token.is_configured());
        assert!(!token.verify(""));
        assert!(!token.verify("anything"));
    }

    #[test]
    fn test_debug_hides_secret() {
        let token = ServiceToken::new(Some(SecretString::from("hunter2")));
        assert!(!format!("{:?}", token).contains("hunter2"));
    }
}
