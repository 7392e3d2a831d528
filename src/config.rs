use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,

    pub database: DatabaseConfig,

    pub auth: AuthConfig,

    pub identity: IdentityConfig,

    pub security: SecurityConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            cors_allowed_origins: vec!["*".to_string()],
            worker_threads: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection string, e.g. `sqlite:data/keywarden.db`.
    pub url: String,

    /// Maximum database connections (default: 5)
    pub max_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 5,
            min_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 signing secret for session tokens. Required.
    pub session_secret: String,

    /// Session token lifetime in hours (default: 12)
    pub session_ttl_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_secret: String::new(),
            session_ttl_hours: 12,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Base URL of the identity provider's admin API. Required.
    pub api_url: String,

    /// Bearer secret for the admin API. Required.
    pub secret_key: String,

    /// JWKS endpoint for federated-token verification.
    /// Derived from `api_url` when not set explicitly.
    pub jwks_url: Option<String>,

    /// Expected `iss` claim on federated tokens. Not checked when unset.
    pub issuer: Option<String>,

    /// Request timeout in seconds (default: 10)
    pub request_timeout_seconds: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            secret_key: String::new(),
            jwks_url: None,
            issuer: None,
            request_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    /// Lower values reduce memory usage but decrease GPU resistance.
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations) - higher = more CPU work
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,

    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Required: `DATABASE_URL`, `SESSION_SECRET`, `IDP_API_URL`,
    /// `IDP_SECRET_KEY`. Everything else has a default. Fails fast on a
    /// missing required value or an unparseable optional one.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            server: ServerConfig {
                port: parsed_var("PORT")?.unwrap_or(3000),
                cors_allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                    .map(|raw| {
                        raw.split(',')
                            .map(|s| s.trim().to_string())
                            .filter(|s| !s.is_empty())
                            .collect()
                    })
                    .unwrap_or_else(|_| vec!["*".to_string()]),
                worker_threads: parsed_var("WORKER_THREADS")?.unwrap_or(2),
            },
            database: DatabaseConfig {
                url: required_var("DATABASE_URL")?,
                max_connections: parsed_var("DB_MAX_CONNECTIONS")?.unwrap_or(5),
                min_connections: parsed_var("DB_MIN_CONNECTIONS")?.unwrap_or(1),
            },
            auth: AuthConfig {
                session_secret: required_var("SESSION_SECRET")?,
                session_ttl_hours: parsed_var("SESSION_TTL_HOURS")?.unwrap_or(12),
            },
            identity: IdentityConfig {
                api_url: required_var("IDP_API_URL")?,
                secret_key: required_var("IDP_SECRET_KEY")?,
                jwks_url: std::env::var("IDP_JWKS_URL").ok(),
                issuer: std::env::var("IDP_ISSUER").ok(),
                request_timeout_seconds: parsed_var("IDP_TIMEOUT_SECONDS")?.unwrap_or(10),
            },
            security: SecurityConfig {
                argon2_memory_cost_kib: parsed_var("ARGON2_MEMORY_COST_KIB")?.unwrap_or(8192),
                argon2_time_cost: parsed_var("ARGON2_TIME_COST")?.unwrap_or(3),
                argon2_parallelism: parsed_var("ARGON2_PARALLELISM")?.unwrap_or(1),
            },
            observability: ObservabilityConfig {
                log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
                metrics_enabled: parsed_var("METRICS_ENABLED")?.unwrap_or(true),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.auth.session_secret.len() < 32 {
            anyhow::bail!("Session secret must be at least 32 bytes");
        }

        if self.auth.session_ttl_hours <= 0 {
            anyhow::bail!("Session TTL must be positive");
        }

        Url::parse(&self.identity.api_url).context("Invalid identity provider API URL")?;

        if let Some(jwks_url) = &self.identity.jwks_url {
            Url::parse(jwks_url).context("Invalid JWKS URL")?;
        }

        if self.identity.secret_key.is_empty() {
            anyhow::bail!("Identity provider secret key cannot be empty");
        }

        Ok(())
    }

    /// JWKS endpoint, falling back to the provider's well-known path.
    #[must_use]
    pub fn jwks_url(&self) -> String {
        self.identity.jwks_url.clone().unwrap_or_else(|| {
            format!(
                "{}/.well-known/jwks.json",
                self.identity.api_url.trim_end_matches('/')
            )
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("Missing required environment variable {name}"))
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => {
            let value = raw
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid value for {name}: {e}"))?;
            Ok(Some(value))
        }
        Err(_) => Ok(None),
    }
}
