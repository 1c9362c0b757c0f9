//! Server, database and environment configuration.

use anyhow::{Context, Result, anyhow};
use secrecy::{ExposeSecret, SecretString};
use std::{fmt, str::FromStr, time::Duration};
use url::Url;

use super::rate_limit::LimiterConfig;

const DEFAULT_PORT: u16 = 4000;
const DEFAULT_MAX_CONNECTIONS: u32 = 25;
const DEFAULT_MAX_IDLE: Duration = Duration::from_secs(15 * 60);
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub const VARIANTS: [&'static str; 3] = ["development", "staging", "production"];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "development" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" => Ok(Self::Production),
            other => Err(anyhow!("unknown environment: {other}")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    dsn: SecretString,
    max_connections: u32,
    max_idle: Duration,
    acquire_timeout: Duration,
}

impl DatabaseConfig {
    #[must_use]
    pub fn new(dsn: SecretString) -> Self {
        Self {
            dsn,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_idle: DEFAULT_MAX_IDLE,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    #[must_use]
    pub fn with_max_idle(mut self, max_idle: Duration) -> Self {
        self.max_idle = max_idle;
        self
    }

    #[must_use]
    pub fn dsn(&self) -> &SecretString {
        &self.dsn
    }

    #[must_use]
    pub fn max_connections(&self) -> u32 {
        self.max_connections
    }

    #[must_use]
    pub fn max_idle(&self) -> Duration {
        self.max_idle
    }

    #[must_use]
    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }

    /// DSN with the password replaced, safe for logs.
    ///
    /// # Errors
    /// Returns an error if the DSN is not a valid URL.
    pub fn redacted_dsn(&self) -> Result<String> {
        let mut url = Url::parse(self.dsn.expose_secret()).context("Invalid DSN")?;
        if url.password().is_some() {
            url.set_password(Some("****"))
                .map_err(|()| anyhow!("Failed to redact DSN password"))?;
        }
        Ok(url.to_string())
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    port: u16,
    environment: Environment,
    database: DatabaseConfig,
    limiter: LimiterConfig,
}

impl ServerConfig {
    #[must_use]
    pub fn new(database: DatabaseConfig) -> Self {
        Self {
            port: DEFAULT_PORT,
            environment: Environment::default(),
            database,
            limiter: LimiterConfig::new(),
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    #[must_use]
    pub fn with_limiter(mut self, limiter: LimiterConfig) -> Self {
        self.limiter = limiter;
        self
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn environment(&self) -> Environment {
        self.environment
    }

    #[must_use]
    pub fn database(&self) -> &DatabaseConfig {
        &self.database
    }

    #[must_use]
    pub fn limiter(&self) -> &LimiterConfig {
        &self.limiter
    }
}
