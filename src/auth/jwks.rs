//! JWT verification against an issuer's JSON Web Key Set.
//!
//! Keys are cached by `kid`; a token signed with an unknown `kid` triggers
//! one refresh of the key set, which picks up rotated keys.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::auth::{IdentityResolver, Principal};
use crate::error::AuthError;

/// Signature algorithms accepted from the issuer. Symmetric algorithms are
/// never accepted since the key set is public.
const ALLOWED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
];

/// Where to find signing keys and which claims to enforce.
#[derive(Debug, Clone)]
pub struct JwksConfig {
    pub jwks_url: String,
    /// Required `iss` claim, if set.
    pub issuer: Option<String>,
    /// Required `aud` claim, if set.
    pub audience: Option<String>,
    /// Timeout for fetching the key set.
    pub fetch_timeout: Duration,
}

impl JwksConfig {
    /// Derive the conventional key set location from an issuer URL.
    pub fn from_issuer(issuer: &str, fetch_timeout: Duration) -> Self {
        let issuer = issuer.trim_end_matches('/');
        Self {
            jwks_url: format!("{}/.well-known/jwks.json", issuer),
            issuer: Some(issuer.to_string()),
            audience: None,
            fetch_timeout,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: Option<String>,
}

/// Identity resolver backed by a remote JWKS.
#[derive(Clone)]
pub struct JwksResolver {
    config: JwksConfig,
    client: Client,
    keys: Arc<RwLock<HashMap<String, Jwk>>>,
}

impl JwksResolver {
    pub fn new(config: JwksConfig) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(config.fetch_timeout)
            .build()
            .map_err(|e| AuthError::JwksFetch(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            config,
            client,
            keys: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Look up a key by `kid`, refreshing the cache on a miss.
    async fn key(&self, kid: &str) -> Result<Jwk, AuthError> {
        if let Some(jwk) = self.keys.read().await.get(kid) {
            return Ok(jwk.clone());
        }

        self.refresh().await?;

        self.keys
            .read()
            .await
            .get(kid)
            .cloned()
            .ok_or_else(|| AuthError::KeyNotFound(kid.to_string()))
    }

    /// Replace the cached key set with the issuer's current one.
    pub async fn refresh(&self) -> Result<(), AuthError> {
        tracing::debug!(url = %self.config.jwks_url, "Fetching JWKS");

        let response = self
            .client
            .get(&self.config.jwks_url)
            .send()
            .await
            .map_err(|e| AuthError::JwksFetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::JwksFetch(format!(
                "{} returned status {}",
                self.config.jwks_url,
                response.status()
            )));
        }

        let set: JwkSet = response
            .json()
            .await
            .map_err(|e| AuthError::JwksFetch(format!("invalid key set: {}", e)))?;

        let keys: HashMap<String, Jwk> = set
            .keys
            .into_iter()
            .filter_map(|jwk| jwk.common.key_id.clone().map(|kid| (kid, jwk)))
            .collect();

        tracing::info!(count = keys.len(), url = %self.config.jwks_url, "JWKS cache refreshed");
        *self.keys.write().await = keys;
        Ok(())
    }

    fn validation(&self, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        if let Some(ref issuer) = self.config.issuer {
            validation.set_issuer(&[issuer]);
        }
        match self.config.audience {
            Some(ref audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        validation
    }
}

#[async_trait]
impl IdentityResolver for JwksResolver {
    async fn resolve(&self, credential: &str) -> Result<Principal, AuthError> {
        let header = decode_header(credential)?;
        if !ALLOWED_ALGORITHMS.contains(&header.alg) {
            return Err(AuthError::InvalidToken(format!(
                "unsupported algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("token missing key id".to_string()))?;

        let jwk = self.key(&kid).await?;
        let key = DecodingKey::from_jwk(&jwk)
            .map_err(|e| AuthError::InvalidToken(format!("unusable signing key: {}", e)))?;

        let data = decode::<Claims>(credential, &key, &self.validation(header.alg))?;

        match data.claims.sub {
            Some(sub) if !sub.is_empty() => Ok(Principal::new(sub)),
            _ => Err(AuthError::MissingSubject),
        }
    }
}
