//! Configuration loaded from the process environment.
//!
//! Call `dotenvy::dotenv()` before `Config::from_env()` to pick up a local
//! `.env` file.

use std::net::SocketAddr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Queue URL placeholder shipped in sample env files. Treated as unset.
const QUEUE_URL_PLACEHOLDER: &str = "your_queue_url";

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    /// `None` selects the in-memory store.
    pub database: Option<DatabaseConfig>,
    /// `None` selects the simulated queue.
    pub queue: Option<QueueConfig>,
    pub auth: AuthConfig,
    pub timeouts: Timeouts,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl ServerConfig {
    pub fn addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigError::InvalidValue {
                key: "HOST".to_string(),
                message: format!("{}:{} is not a socket address: {}", self.host, self.port, e),
            })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_allowed_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: SecretString,
    pub pool_size: usize,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub url: String,
    pub token: Option<SecretString>,
}

#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Explicit key set location. Takes precedence over `issuer`.
    pub jwks_url: Option<String>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    /// Credential for the administrative surface. Unset disables it.
    pub service_token: Option<SecretString>,
    /// Accept submissions and reads without a credential (ownerless jobs).
    pub allow_anonymous: bool,
}

/// Bounds on every call to an external collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub store: Duration,
    pub queue: Duration,
    pub auth: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            store: Duration::from_secs(5),
            queue: Duration::from_secs(10),
            auth: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Build configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let defaults = ServerConfig::default();
        let server = ServerConfig {
            host: get("HOST").unwrap_or(defaults.host),
            port: parse_or("PORT", get("PORT"), defaults.port)?,
            cors_allowed_origins: get("CORS_ALLOWED_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.cors_allowed_origins),
        };

        let database = match get("DATABASE_URL") {
            Some(url) => {
                let pool_size = parse_or("DATABASE_POOL_SIZE", get("DATABASE_POOL_SIZE"), 10usize)?;
                if pool_size == 0 {
                    return Err(ConfigError::InvalidValue {
                        key: "DATABASE_POOL_SIZE".to_string(),
                        message: "must be at least 1".to_string(),
                    });
                }
                Some(DatabaseConfig {
                    url: SecretString::from(url),
                    pool_size,
                })
            }
            None => None,
        };

        let queue = get("JOB_QUEUE_URL")
            .filter(|url| url != QUEUE_URL_PLACEHOLDER)
            .map(|url| QueueConfig {
                url,
                token: get("JOB_QUEUE_TOKEN").map(SecretString::from),
            });

        let auth = AuthConfig {
            jwks_url: get("AUTH_JWKS_URL"),
            issuer: get("AUTH_ISSUER"),
            audience: get("AUTH_AUDIENCE"),
            service_token: get("SERVICE_API_TOKEN").map(SecretString::from),
            allow_anonymous: parse_bool(
                "ALLOW_ANONYMOUS_SUBMISSIONS",
                get("ALLOW_ANONYMOUS_SUBMISSIONS"),
            )?,
        };

        let defaults = Timeouts::default();
        let timeouts = Timeouts {
            store: parse_secs("STORE_TIMEOUT_SECS", get("STORE_TIMEOUT_SECS"), defaults.store)?,
            queue: parse_secs("QUEUE_TIMEOUT_SECS", get("QUEUE_TIMEOUT_SECS"), defaults.queue)?,
            auth: parse_secs("AUTH_TIMEOUT_SECS", get("AUTH_TIMEOUT_SECS"), defaults.auth)?,
        };

        Ok(Self {
            server,
            database,
            queue,
            auth,
            timeouts,
        })
    }

    /// Fail fast on combinations that cannot serve authenticated traffic.
    pub fn require_identity_provider(&self) -> Result<(), ConfigError> {
        if self.auth.jwks_url.is_none() && self.auth.issuer.is_none() {
            return Err(ConfigError::MissingRequired {
                key: "AUTH_JWKS_URL".to_string(),
                hint: "Set AUTH_JWKS_URL or AUTH_ISSUER to verify caller tokens".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(v) => v.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{}': {}", v, e),
        }),
        None => Ok(default),
    }
}

fn parse_secs(key: &str, raw: Option<String>, default: Duration) -> Result<Duration, ConfigError> {
    let secs = parse_or(key, raw, default.as_secs())?;
    if secs == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "timeout must be at least one second".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

fn parse_bool(key: &str, raw: Option<String>) -> Result<bool, ConfigError> {
    match raw.as_deref().map(str::to_lowercase).as_deref() {
        None => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{}' is not a boolean", other),
        }),
    }
}
