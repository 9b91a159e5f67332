use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

pub const DEFAULT_SESSION_YEAR: i32 = 2026;
pub const DEFAULT_PASSWORD_COST: u32 = 12;

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub storage: StorageConfig,
    pub registration: RegistrationConfig,
    pub admin: AdminConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let trust_proxy = parse_flag("APP_TRUST_PROXY", false)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let database_path = env::var("REGISTRAR_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/registrar.db"));

        let session_year = parse_var("REGISTRAR_SESSION_YEAR", DEFAULT_SESSION_YEAR)?;
        if !(2000..=2100).contains(&session_year) {
            return Err(ConfigError::InvalidNumber {
                key: "REGISTRAR_SESSION_YEAR",
            });
        }

        let token_ttl_hours = parse_var("REGISTRAR_TOKEN_TTL_HOURS", 24u32)?;
        let remember_ttl_days = parse_var("REGISTRAR_REMEMBER_TTL_DAYS", 30u32)?;
        let password_cost = parse_var("REGISTRAR_PASSWORD_COST", DEFAULT_PASSWORD_COST)?;
        if !(4..=31).contains(&password_cost) {
            return Err(ConfigError::InvalidNumber {
                key: "REGISTRAR_PASSWORD_COST",
            });
        }

        let bootstrap_email = env::var("REGISTRAR_BOOTSTRAP_EMAIL")
            .ok()
            .filter(|value| !value.trim().is_empty());
        let bootstrap_password = env::var("REGISTRAR_BOOTSTRAP_PASSWORD")
            .ok()
            .filter(|value| !value.is_empty());

        Ok(Self {
            environment,
            server: ServerConfig {
                host,
                port,
                trust_proxy,
            },
            telemetry: TelemetryConfig { log_level },
            storage: StorageConfig { database_path },
            registration: RegistrationConfig { session_year },
            admin: AdminConfig {
                token_ttl_hours,
                remember_ttl_days,
                password_cost,
                bootstrap_email,
                bootstrap_password,
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key }),
        Err(_) => Ok(default),
    }
}

fn parse_flag(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(ConfigError::InvalidFlag { key }),
        },
        Err(_) => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Set when a reverse proxy in front of the server owns `X-Forwarded-For`.
    pub trust_proxy: bool,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Location of the SQLite database file.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

/// Intake settings.
#[derive(Debug, Clone)]
pub struct RegistrationConfig {
    pub session_year: i32,
}

/// Admin session lifetimes and the optional first-operator bootstrap.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub token_ttl_hours: u32,
    pub remember_ttl_days: u32,
    pub password_cost: u32,
    pub bootstrap_email: Option<String>,
    pub bootstrap_password: Option<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str },
    InvalidFlag { key: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key } => {
                write!(f, "{key} must be a valid number in range")
            }
            ConfigError::InvalidFlag { key } => write!(f, "{key} must be true or false"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::InvalidFlag { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
