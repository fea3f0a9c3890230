use serde::Deserialize;

use crate::error::ConfigError;

const MIN_SECRET_LENGTH: usize = 32;
const MAX_ACCESS_TOKEN_TTL_MS: i64 = 24 * 60 * 60 * 1000; // 1 day
const MAX_REFRESH_TOKEN_TTL_SECONDS: i64 = 10 * 365 * 24 * 60 * 60; // ~10 years

#[derive(Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
}

#[derive(Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// What happens to a refresh token once it has been exchanged
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// The presented token is echoed back and stays valid until it expires
    #[default]
    Reuse,
    /// The presented token is replaced by a new one on every refresh
    Rotate,
}

/// Token lifetimes and signing settings
#[derive(Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub issuer: String,
    pub access_token_ttl_ms: i64,      // e.g. 900000 for 15 minutes
    pub refresh_token_ttl_seconds: i64, // e.g. 604800 for 7 days
    #[serde(default)]
    pub refresh_policy: RefreshPolicy,
}

impl JwtSettings {
    /// Saturates at `Duration::MAX`; unvalidated extremes then fail at issue time
    pub fn access_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::try_milliseconds(self.access_token_ttl_ms).unwrap_or(chrono::Duration::MAX)
    }

    /// Saturates at `Duration::MAX`; unvalidated extremes then fail at issue time
    pub fn refresh_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::try_seconds(self.refresh_token_ttl_seconds).unwrap_or(chrono::Duration::MAX)
    }
}

impl Settings {
    /// Reject settings the service cannot run safely with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt.secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::InvalidValue(format!(
                "jwt.secret must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }
        if self.jwt.issuer.trim().is_empty() {
            return Err(ConfigError::MissingRequired("jwt.issuer".to_string()));
        }
        let access_ttl_ok = (1..=MAX_ACCESS_TOKEN_TTL_MS).contains(&self.jwt.access_token_ttl_ms)
            && chrono::Duration::try_milliseconds(self.jwt.access_token_ttl_ms).is_some();
        if !access_ttl_ok {
            return Err(ConfigError::InvalidValue(format!(
                "jwt.access_token_ttl_ms must be between 1 and {}",
                MAX_ACCESS_TOKEN_TTL_MS
            )));
        }
        let refresh_ttl_ok = (1..=MAX_REFRESH_TOKEN_TTL_SECONDS)
            .contains(&self.jwt.refresh_token_ttl_seconds)
            && chrono::Duration::try_seconds(self.jwt.refresh_token_ttl_seconds).is_some();
        if !refresh_ttl_ok {
            return Err(ConfigError::InvalidValue(format!(
                "jwt.refresh_token_ttl_seconds must be between 1 and {}",
                MAX_REFRESH_TOKEN_TTL_SECONDS
            )));
        }
        Ok(())
    }
}

/// Load settings from `configuration.{yaml,toml,json}` and `APP_*` environment
/// variables (`APP_JWT__SECRET` overrides `jwt.secret`).
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;
    let settings = settings.try_deserialize::<Settings>()?;
    settings.validate()?;
    Ok(settings)
}
