use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand, ValueEnum};
use expensedb_mariadb::MariaDbSettings;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use crate::repository::StoreSettings;

#[derive(Parser, Debug)]
#[command(name = "expensedb", about = "expensedb - expense record store")]
pub struct CliArgs {
    /// Path to config file
    #[arg(short, long, default_value = "expensedb.toml")]
    pub config: String,

    /// Storage backend (overrides config file)
    #[arg(long, value_enum)]
    pub db_type: Option<DbType>,

    /// Log level (overrides config file)
    #[arg(short, long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List expenses one page at a time
    List {
        #[arg(long, default_value_t = expensedb_core::DEFAULT_PAGE)]
        page: u32,
        #[arg(long, default_value_t = expensedb_core::DEFAULT_PAGE_SIZE)]
        page_size: u32,
    },
    /// Fetch expenses by id; unknown ids are skipped
    Get {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        price: Decimal,
        #[arg(long)]
        currency: String,
    },
    /// Update the given fields; omitted fields are left alone
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        price: Option<Decimal>,
        #[arg(long)]
        currency: Option<String>,
    },
    Delete {
        id: String,
    },
    Count,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{0} must be set and should not be empty")]
    MissingProperty(&'static str),
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    /// Embedded key-value file store
    Boltdb,
    /// MariaDB/MySQL server
    Mariadb,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub boltdb: BoltDbConfig,

    #[serde(default)]
    pub mariadb: MariaDbConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_db_type")]
    pub db_type: DbType,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,

    /// Destinations: `stderr`, `stdout` or a file path to append to.
    #[serde(default = "default_log_output")]
    pub output: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BoltDbConfig {
    #[serde(default = "default_boltdb_filename")]
    pub filename: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MariaDbConfig {
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_max_open_connections")]
    pub max_open_connections: u32,

    #[serde(default = "default_max_idle_connections")]
    pub max_idle_connections: u32,

    #[serde(default = "default_conn_max_lifetime_secs")]
    pub conn_max_lifetime_secs: u64,
}

fn default_db_type() -> DbType {
    DbType::Boltdb
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_output() -> Vec<String> {
    vec!["stderr".to_string()]
}

fn default_boltdb_filename() -> String {
    "expenses.db".to_string()
}

fn default_max_open_connections() -> u32 {
    100
}

fn default_max_idle_connections() -> u32 {
    10
}

fn default_conn_max_lifetime_secs() -> u64 {
    120
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            db_type: default_db_type(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            json: false,
            output: default_log_output(),
        }
    }
}

impl Default for BoltDbConfig {
    fn default() -> Self {
        BoltDbConfig {
            filename: default_boltdb_filename(),
        }
    }
}

impl Default for MariaDbConfig {
    fn default() -> Self {
        MariaDbConfig {
            url: String::new(),
            max_open_connections: default_max_open_connections(),
            max_idle_connections: default_max_idle_connections(),
            conn_max_lifetime_secs: default_conn_max_lifetime_secs(),
        }
    }
}

impl Config {
    /// Reads the config file (a missing file means defaults), applies CLI
    /// overrides and checks the properties the selected backend needs.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = match std::fs::read_to_string(&cli.config) {
            Ok(contents) => Self::from_toml(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: cli.config.clone(),
                    source,
                })
            }
        };

        // CLI overrides
        if let Some(db_type) = cli.db_type {
            config.app.db_type = db_type;
        }
        if let Some(ref level) = cli.log_level {
            config.logging.level = level.clone();
        }

        config.store_settings()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// The parameter set for the configured backend.
    pub fn store_settings(&self) -> Result<StoreSettings, ConfigError> {
        match self.app.db_type {
            DbType::Boltdb => {
                let filename = self.boltdb.filename.trim();
                if filename.is_empty() {
                    return Err(ConfigError::MissingProperty("boltdb.filename"));
                }
                Ok(StoreSettings::Embedded {
                    path: PathBuf::from(filename),
                })
            }
            DbType::Mariadb => {
                let url = self.mariadb.url.trim();
                if url.is_empty() {
                    return Err(ConfigError::MissingProperty("mariadb.url"));
                }
                // 0 means unlimited for both limits.
                Ok(StoreSettings::MariaDb(MariaDbSettings {
                    url: url.to_string(),
                    max_open_connections: Some(self.mariadb.max_open_connections).filter(|n| *n > 0),
                    max_idle_connections: self.mariadb.max_idle_connections,
                    conn_max_lifetime: Some(self.mariadb.conn_max_lifetime_secs)
                        .filter(|secs| *secs > 0)
                        .map(Duration::from_secs),
                }))
            }
        }
    }
}
