//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables.
//! Nothing here carries a built-in credential: the warehouse login and the
//! Azure identity are always supplied by the environment.

use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::new(0, 0, 0, 0),
            port: 5000,
        }
    }
}

/// Warehouse connection configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_pool_size: usize,
    pub require_tls: bool,
    /// Bounds opening a connection and waiting for a free pool slot
    pub connect_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            database: "analytics_dw".to_string(),
            max_pool_size: 10,
            require_tls: false,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        // Empty means any origin.
        Self {
            allowed_origins: Vec::new(),
        }
    }
}

/// Azure Data Factory coordinates
#[derive(Debug, Clone)]
pub struct DataFactoryConfig {
    pub subscription_id: String,
    pub resource_group: String,
    pub factory_name: String,
    pub management_endpoint: String,
}

/// Pipeline run polling configuration
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(3600),
        }
    }
}

/// Complete application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cors: CorsConfig,
    /// `None` when no factory is configured; orchestration routes then answer 503.
    pub data_factory: Option<DataFactoryConfig>,
    pub poll: PollConfig,
}

pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup so tests don't touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server = ServerConfig {
            host: parse_or(&lookup, "HOST", ServerConfig::default().host)?,
            port: parse_or(&lookup, "PORT", ServerConfig::default().port)?,
        };

        let max_pool_size = parse_or(&lookup, "DB_MAX_CONNECTIONS", 10usize)?;
        if max_pool_size == 0 {
            return Err(ConfigError::InvalidValue(
                "DB_MAX_CONNECTIONS must be at least 1".to_string(),
            ));
        }
        let connect_timeout = Duration::from_secs(parse_or(
            &lookup,
            "DB_CONNECT_TIMEOUT_SECS",
            DatabaseConfig::default().connect_timeout.as_secs(),
        )?);
        if connect_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "DB_CONNECT_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }
        let require_tls = lookup("DB_SSLMODE")
            .map(|mode| mode.eq_ignore_ascii_case("require"))
            .unwrap_or(false);

        // Try DATABASE_URL first, fall back to individual vars
        let database = if let Some(database_url) = lookup("DATABASE_URL") {
            let mut database = Self::parse_database_url(&database_url)?;
            database.max_pool_size = max_pool_size;
            database.connect_timeout = connect_timeout;
            database.require_tls |= require_tls;
            database
        } else {
            let defaults = DatabaseConfig::default();
            DatabaseConfig {
                host: lookup("DB_HOST").unwrap_or(defaults.host),
                port: parse_or(&lookup, "DB_PORT", defaults.port)?,
                user: lookup("DB_USER").unwrap_or(defaults.user),
                password: lookup("DB_PASSWORD").unwrap_or_default(),
                database: lookup("DB_NAME").unwrap_or(defaults.database),
                max_pool_size,
                require_tls,
                connect_timeout,
            }
        };

        let cors = CorsConfig {
            allowed_origins: lookup("ALLOWED_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        };

        let data_factory = Self::load_data_factory(&lookup)?;

        let poll = PollConfig {
            interval: Duration::from_secs(parse_or(&lookup, "POLL_INTERVAL_SECS", 30u64)?),
            timeout: Duration::from_secs(parse_or(&lookup, "POLL_TIMEOUT_SECS", 3600u64)?),
        };
        if poll.interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "POLL_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }
        if poll.timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "POLL_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            server,
            database,
            cors,
            data_factory,
            poll,
        })
    }

    /// All three factory coordinates or none of them.
    fn load_data_factory<F>(lookup: &F) -> Result<Option<DataFactoryConfig>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let keys = ["ADF_SUBSCRIPTION_ID", "ADF_RESOURCE_GROUP", "ADF_FACTORY_NAME"];
        let values: Vec<Option<String>> = keys
            .iter()
            .map(|key| lookup(key).filter(|v| !v.trim().is_empty()))
            .collect();

        if values.iter().all(Option::is_none) {
            return Ok(None);
        }
        if let Some(missing) = keys.iter().zip(&values).find(|(_, v)| v.is_none()) {
            return Err(ConfigError::MissingVar(missing.0.to_string()));
        }

        let mut values = values.into_iter().flatten();
        let (Some(subscription_id), Some(resource_group), Some(factory_name)) =
            (values.next(), values.next(), values.next())
        else {
            return Err(ConfigError::InvalidValue(
                "Incomplete Data Factory configuration".to_string(),
            ));
        };

        let management_endpoint = lookup("ADF_MANAGEMENT_ENDPOINT")
            .unwrap_or_else(|| DEFAULT_MANAGEMENT_ENDPOINT.to_string());
        url::Url::parse(&management_endpoint).map_err(|e| {
            ConfigError::InvalidValue(format!("ADF_MANAGEMENT_ENDPOINT is not a URL: {}", e))
        })?;

        Ok(Some(DataFactoryConfig {
            subscription_id,
            resource_group,
            factory_name,
            management_endpoint: management_endpoint.trim_end_matches('/').to_string(),
        }))
    }

    /// Parse a DATABASE_URL connection string (postgresql://...)
    fn parse_database_url(url: &str) -> Result<DatabaseConfig, ConfigError> {
        let parsed = url::Url::parse(url).map_err(|_| {
            ConfigError::InvalidValue(
                "Invalid DATABASE_URL format (expected postgresql://...)".to_string(),
            )
        })?;

        if !matches!(parsed.scheme(), "postgres" | "postgresql") {
            return Err(ConfigError::InvalidValue(format!(
                "Unsupported DATABASE_URL scheme '{}'",
                parsed.scheme()
            )));
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| ConfigError::InvalidValue("Missing host in DATABASE_URL".to_string()))?
            .to_string();

        let database = parsed.path().trim_start_matches('/').to_string();
        if database.is_empty() {
            return Err(ConfigError::InvalidValue(
                "Missing database name in DATABASE_URL".to_string(),
            ));
        }

        let require_tls = parsed
            .query_pairs()
            .any(|(k, v)| k == "sslmode" && v == "require");

        Ok(DatabaseConfig {
            host,
            port: parsed.port().unwrap_or(5432),
            user: parsed.username().to_string(),
            password: parsed.password().unwrap_or_default().to_string(),
            database,
            require_tls,
            ..DatabaseConfig::default()
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{} has an invalid value '{}'", key, raw))),
        None => Ok(default),
    }
}
