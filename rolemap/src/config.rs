//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `rolemap.yaml` but can be specified via `-f` flag or `ROLEMAP_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `rolemap.yaml`)
//! 2. **Environment variables** - Variables prefixed with `ROLEMAP_` override YAML values
//! 3. **DATABASE_URL** - Special case: overrides `database.url` if set
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `ROLEMAP_LOGIN_ATTEMPTS__RETENTION=2h` sets the `login_attempts.retention` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use rolemap::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Database: {}", config.database.url);
//! # Ok(())
//! # }
//! ```
//!
//! ## Example
//!
//! ```yaml
//! database:
//!   url: sqlite://rolemap.db
//!   max_connections: 5
//! login_attempts:
//!   retention: 1h
//! permissions:
//!   - see users
//!   - add user
//! admin:
//!   name: root
//!   password: change-me
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::auth::password::Argon2Params;
use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "ROLEMAP_CONFIG", default_value = "rolemap.yaml")]
    pub config: String,

    /// Validate configuration and exit without touching the database.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// All fields have sensible defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Overrides `database.url` when set (read from the `DATABASE_URL` env var)
    #[serde(skip_serializing)]
    pub database_url: Option<String>,
    pub database: DatabaseConfig,
    /// Statements slower than this are logged at warn level
    pub slow_statement_threshold_ms: u64,
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_filter: String,
    pub login_attempts: LoginAttemptsConfig,
    /// Argon2 parameters for newly hashed passwords
    pub password: Argon2Params,
    /// Permission names that must exist after startup
    pub permissions: Vec<String>,
    /// Administrator account created on startup if missing
    pub admin: Option<AdminConfig>,
}

/// SQLite connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of idle connections to maintain
    pub min_connections: u32,
    /// Maximum time to wait for a connection (seconds)
    pub acquire_timeout_secs: u64,
    /// Create the database file if it does not exist
    pub create_if_missing: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://rolemap.db".to_string(),
            max_connections: 5,
            min_connections: 0,
            acquire_timeout_secs: 30,
            create_if_missing: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoginAttemptsConfig {
    /// Attempts older than this are pruned
    #[serde(with = "humantime_serde")]
    pub retention: Duration,
    /// Prune old attempts when the binary starts
    pub prune_on_start: bool,
}

impl Default for LoginAttemptsConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(60 * 60),
            prune_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AdminConfig {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Only used when the account is created; an existing password is never replaced
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Role granted every permission and assigned to the administrator
    #[serde(default = "AdminConfig::default_role")]
    pub role: String,
}

impl AdminConfig {
    fn default_role() -> String {
        "Administrator".to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            database: DatabaseConfig::default(),
            slow_statement_threshold_ms: 1000,
            log_filter: "info".to_string(),
            login_attempts: LoginAttemptsConfig::default(),
            password: Argon2Params::default(),
            permissions: Vec::new(),
            admin: None,
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let mut config: Self = Self::figment(args).extract()?;

        // if database_url is set, use it (preserving the pool settings)
        if let Some(url) = config.database_url.take() {
            config.database.url = url;
        }

        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.database.url.trim().is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: database.url must not be empty".to_string(),
            });
        }

        if self.database.max_connections == 0 {
            return Err(Error::Internal {
                operation: "Config validation: database.max_connections must be at least 1".to_string(),
            });
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: database.min_connections ({}) cannot be greater than max_connections ({})",
                    self.database.min_connections, self.database.max_connections
                ),
            });
        }

        if self.login_attempts.retention.is_zero() {
            return Err(Error::Internal {
                operation: "Config validation: login_attempts.retention must be greater than zero".to_string(),
            });
        }

        if self.permissions.iter().any(|name| name.trim().is_empty()) {
            return Err(Error::Internal {
                operation: "Config validation: permission names must not be empty".to_string(),
            });
        }

        if let Some(admin) = &self.admin {
            if admin.name.trim().is_empty() {
                return Err(Error::Internal {
                    operation: "Config validation: admin.name must not be empty".to_string(),
                });
            }
            if admin.role.trim().is_empty() {
                return Err(Error::Internal {
                    operation: "Config validation: admin.role must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("ROLEMAP_").ignore(&["config"]).split("__"))
            // Common DATABASE_URL pattern
            .merge(Env::raw().only(&["DATABASE_URL"]))
    }

    pub fn slow_statement_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_statement_threshold_ms)
    }
}
