use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tracing::warn;

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            database: DatabaseConfig::from_env(),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 8080;

    fn from_env() -> Self {
        let host_value =
            env_string("BOX_PACKER_API_HOST").unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, effective_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                warn!(
                    "Could not parse BOX_PACKER_API_HOST ('{}'): {}. Using {}.",
                    host_value,
                    err,
                    Self::DEFAULT_HOST
                );
                (
                    IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                    Self::DEFAULT_HOST.to_string(),
                )
            }
        };

        let port = match env_string("BOX_PACKER_API_PORT") {
            Some(raw) => match raw.parse::<u16>() {
                Ok(value) if value != 0 => value,
                Ok(_) => {
                    warn!(
                        "BOX_PACKER_API_PORT must not be 0. Using {}.",
                        Self::DEFAULT_PORT
                    );
                    Self::DEFAULT_PORT
                }
                Err(err) => {
                    warn!(
                        "Could not parse BOX_PACKER_API_PORT ('{}'): {}. Using {}.",
                        raw,
                        err,
                        Self::DEFAULT_PORT
                    );
                    Self::DEFAULT_PORT
                }
            },
            None => Self::DEFAULT_PORT,
        };

        Self {
            bind_ip,
            display_host: effective_host,
            port,
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging and hints.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    /// Configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Indicates whether binding to all interfaces.
    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }

    /// Checks whether the hostname matches the default value.
    pub fn uses_default_host(&self) -> bool {
        self.display_host == Self::DEFAULT_HOST
    }
}

/// Configuration for the order database.
#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    url: String,
    max_connections: u32,
    run_migrations: bool,
}

impl DatabaseConfig {
    const DEFAULT_URL: &'static str = "sqlite://box_packer.db?mode=rwc";
    const DEFAULT_MAX_CONNECTIONS: u32 = 5;
    const DEFAULT_RUN_MIGRATIONS: bool = true;

    const URL_VAR: &'static str = "BOX_PACKER_DATABASE_URL";
    const MAX_CONNECTIONS_VAR: &'static str = "BOX_PACKER_DATABASE_MAX_CONNECTIONS";
    const RUN_MIGRATIONS_VAR: &'static str = "BOX_PACKER_RUN_MIGRATIONS";

    fn from_env() -> Self {
        let url = env_string(Self::URL_VAR).unwrap_or_else(|| Self::DEFAULT_URL.to_string());

        let max_connections = match env_string(Self::MAX_CONNECTIONS_VAR) {
            Some(raw) => parse_max_connections(&raw).unwrap_or_else(|| {
                warn!(
                    "{} contains invalid value '{}': must be a whole number greater than 0. Using {}.",
                    Self::MAX_CONNECTIONS_VAR,
                    raw,
                    Self::DEFAULT_MAX_CONNECTIONS
                );
                Self::DEFAULT_MAX_CONNECTIONS
            }),
            None => Self::DEFAULT_MAX_CONNECTIONS,
        };

        let run_migrations = env_string(Self::RUN_MIGRATIONS_VAR)
            .and_then(|raw| parse_bool(&raw, Self::RUN_MIGRATIONS_VAR))
            .unwrap_or(Self::DEFAULT_RUN_MIGRATIONS);

        Self {
            url,
            max_connections,
            run_migrations,
        }
    }

    /// Configuration for an explicit database URL and pool size.
    #[cfg(test)]
    pub fn for_url(url: impl Into<String>, max_connections: u32) -> Self {
        Self {
            url: url.into(),
            max_connections,
            run_migrations: Self::DEFAULT_RUN_MIGRATIONS,
        }
    }

    /// Connection string of the database.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Upper bound of pooled connections.
    pub fn max_connections(&self) -> u32 {
        self.max_connections
    }

    /// Whether the embedded migrations run on startup.
    pub fn run_migrations(&self) -> bool {
        self.run_migrations
    }
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!("Access to {} failed: {}. Using default value.", name, err);
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            warn!(
                "Could not interpret {} ('{}') as boolean value. Using default value.",
                var_name, other
            );
            None
        }
    }
}

fn parse_max_connections(raw: &str) -> Option<u32> {
    match raw.trim().parse::<u32>() {
        Ok(value) if value > 0 => Some(value),
        _ => None,
    }
}
