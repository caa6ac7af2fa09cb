use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub database: DatabaseConfig,

    pub security: SecurityConfig,

    pub rcon: RconConfig,

    pub observability: ObservabilityConfig,

    /// File the config was read from. `None` means built-in defaults.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,

    /// Use during development, not production.
    /// Raises logging to `debug` and prints SQL statements.
    pub debug: bool,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            debug: false,
            worker_threads: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface for the webserver to bind to
    pub interface: String,

    /// Port for the webserver to bind to
    pub port: u16,

    /// Directory served for every path no route claims (CSS/JS).
    pub public_dir: String,

    /// Directory holding one file per session.
    pub session_dir: String,

    /// Sessions expire after this many minutes without a request.
    pub session_inactivity_minutes: i64,

    /// Whether to set the Secure flag on session cookies.
    /// Default: false, the console binds to loopback unless told otherwise.
    pub secure_cookies: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            interface: "127.0.0.1".to_string(),
            port: 6015,
            public_dir: "public".to_string(),
            session_dir: "app/sessions".to_string(),
            session_inactivity_minutes: 60 * 24,
            secure_cookies: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseDriver {
    Sqlite,
    Postgres,
    MySql,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database driver: sqlite, postgres or mysql
    pub driver: String,

    /// Database string: a file path for sqlite, a DSN otherwise
    pub database: String,

    /// Maximum database connections (default: 5)
    pub max_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: "sqlite".to_string(),
            database: "sorbet.db".to_string(),
            max_connections: 5,
            min_connections: 1,
        }
    }
}

impl DatabaseConfig {
    /// Normalizes the configured driver name. `sqlite3`, `SQLite` and friends
    /// all mean SQLite; anything mentioning postgres means PostgreSQL.
    pub fn driver(&self) -> Result<DatabaseDriver> {
        let driver = self.driver.to_lowercase();

        if driver.contains("sqlite") {
            Ok(DatabaseDriver::Sqlite)
        } else if driver.contains("postgres") {
            Ok(DatabaseDriver::Postgres)
        } else if driver.contains("mysql") {
            Ok(DatabaseDriver::MySql)
        } else {
            anyhow::bail!("Unsupported database driver: {}", self.driver)
        }
    }

    /// Builds the connection URL handed to `SeaORM`.
    pub fn url(&self) -> Result<String> {
        let database = self.database.trim();

        let url = match self.driver()? {
            DatabaseDriver::Sqlite => {
                if database == ":memory:" || database == "sqlite::memory:" {
                    "sqlite::memory:".to_string()
                } else {
                    let path = database.trim_start_matches("sqlite://");
                    let path = path.trim_start_matches("sqlite:");
                    if path.contains('?') {
                        format!("sqlite:{path}")
                    } else {
                        format!("sqlite:{path}?mode=rwc")
                    }
                }
            }
            DatabaseDriver::Postgres => {
                if database.starts_with("postgres://") || database.starts_with("postgresql://") {
                    database.to_string()
                } else {
                    format!("postgres://{database}")
                }
            }
            DatabaseDriver::MySql => {
                if database.starts_with("mysql://") {
                    database.to_string()
                } else {
                    format!("mysql://{database}")
                }
            }
        };

        Ok(url)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,

    /// Issuer shown by authenticator apps.
    pub totp_issuer: String,

    /// Accepted clock drift, in 30 second steps, either side of now.
    pub totp_skew: u8,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
            totp_issuer: "Sorbet".to_string(),
            totp_skew: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RconConfig {
    /// Connect and read timeout for remote console sessions.
    pub timeout_seconds: u64,
}

impl Default for RconConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
        }
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub debug: bool,
    pub port: Option<u16>,
    pub interface: Option<String>,
    pub driver: Option<String>,
    pub database: Option<String>,
}

impl Config {
    /// Reads the first config file found. Runs before tracing is set up, so
    /// it records the file in [`Config::source`] instead of logging.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }

        for path in &Self::config_paths() {
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.source = Some(path.to_path_buf());

        Ok(config)
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("sorbet.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("sorbet").join("sorbet.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".sorbet").join("sorbet.toml"));
        }

        paths
    }

    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if overrides.debug {
            self.general.debug = true;
            self.general.log_level = "debug".to_string();
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(interface) = overrides.interface {
            self.server.interface = interface;
        }
        if let Some(driver) = overrides.driver {
            self.database.driver = driver;
        }
        if let Some(database) = overrides.database {
            self.database.database = database;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be > 0");
        }

        if self.server.interface.trim().is_empty() {
            anyhow::bail!("Server interface cannot be empty");
        }

        self.database.driver()?;

        if self.security.totp_skew > 10 {
            anyhow::bail!("security.totp_skew must be 10 steps or fewer");
        }

        Ok(())
    }

    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.interface, self.server.port)
    }
}
