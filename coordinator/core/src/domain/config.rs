// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// PingPong Configuration Types
//
// Defines the configuration manifest for a PingPong player process:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Turn Counter store selection and connection settings
// - Coordinator pacing
// - Observability settings

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::turn::CounterKey;

pub const API_VERSION: &str = "pingpong/v1";
pub const KIND: &str = "PingPongConfig";

/// Top-level configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingPongConfig {
    /// API version (must be "pingpong/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "PingPongConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: PingPongSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable player name, used in log lines
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PingPongSpec {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreBackend {
    InMemory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Which Turn Counter store to use
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// Table holding the Turn Counter row
    #[serde(default = "default_table")]
    pub table: String,

    /// Primary key of the Turn Counter row
    #[serde(default = "default_key")]
    pub key: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres: Option<PostgresStoreConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresStoreConfig {
    /// Cluster endpoint, e.g. "<id>.dsql.us-east-1.on.aws"
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_database")]
    pub database: String,

    #[serde(default = "default_user")]
    pub user: String,

    /// Password or pre-minted auth token (supports "env:VAR_NAME")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// "disable", "prefer", "require", "verify-ca" or "verify-full"
    #[serde(default = "default_sslmode")]
    pub sslmode: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default)]
    pub isolation: IsolationLevel,

    /// Command whose stdout is a fresh auth token (e.g. `aws dsql
    /// generate-db-connect-admin-auth-token ...`). Run at connect and on
    /// every token refresh. Takes precedence over `password`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_command: Option<String>,

    /// How often the pool's connect options are rebuilt with a new token,
    /// in seconds. 0 disables the refresh.
    #[serde(default = "default_token_refresh_secs")]
    pub token_refresh_secs: u64,
}

/// Isolation level requested at the start of every coordinator transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationLevel {
    /// Leave the session default in place (Aurora DSQL only offers
    /// repeatable read with optimistic concurrency).
    #[default]
    StoreDefault,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(self) -> Option<&'static str> {
        match self {
            IsolationLevel::StoreDefault => None,
            IsolationLevel::RepeatableRead => Some("REPEATABLE READ"),
            IsolationLevel::Serializable => Some("SERIALIZABLE"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Pause after an idle tick, in milliseconds. 0 only yields to the
    /// scheduler, which busy-polls the store.
    #[serde(default)]
    pub idle_backoff_ms: u64,

    /// Stop after this many confirmed moves by this player
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_moves: Option<u64>,
}

impl CoordinatorConfig {
    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_backend() -> StoreBackend {
    StoreBackend::InMemory
}

fn default_table() -> String {
    "turn_counter".to_string()
}

fn default_key() -> i64 {
    1
}

fn default_port() -> u16 {
    5432
}

fn default_database() -> String {
    "postgres".to_string()
}

fn default_user() -> String {
    "admin".to_string()
}

fn default_sslmode() -> String {
    "require".to_string()
}

fn default_max_connections() -> u32 {
    2
}

fn default_token_refresh_secs() -> u64 {
    600
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            table: default_table(),
            key: default_key(),
            postgres: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for PingPongConfig {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "pingpong-player".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: None,
            },
            spec: PingPongSpec::default(),
        }
    }
}

impl PostgresStoreConfig {
    /// Config for an Aurora DSQL cluster, deriving the endpoint from the
    /// cluster identifier and region.
    pub fn for_dsql_cluster(identifier: &str, region: &str) -> Self {
        Self {
            host: dsql_endpoint(identifier, region),
            port: default_port(),
            database: default_database(),
            user: default_user(),
            password: None,
            sslmode: default_sslmode(),
            max_connections: default_max_connections(),
            isolation: IsolationLevel::default(),
            password_command: None,
            token_refresh_secs: default_token_refresh_secs(),
        }
    }

    /// Resolve the password, following an "env:VAR_NAME" indirection.
    pub fn resolved_password(&self) -> anyhow::Result<Option<String>> {
        match self.password.as_deref() {
            None => Ok(None),
            Some(raw) => match raw.strip_prefix("env:") {
                Some(var) => std::env::var(var)
                    .map(Some)
                    .map_err(|_| anyhow::anyhow!("Password environment variable '{}' is not set", var)),
                None => Ok(Some(raw.to_string())),
            },
        }
    }
}

/// Endpoint of an Aurora DSQL cluster.
pub fn dsql_endpoint(identifier: &str, region: &str) -> String {
    format!("{}.dsql.{}.on.aws", identifier, region)
}

impl PingPongConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. PINGPONG_CONFIG_PATH environment variable
    /// 2. ./pingpong-config.yaml (working directory)
    /// 3. ~/.pingpong/config.yaml (user home)
    /// 4. /etc/pingpong/config.yaml (system, Unix)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("PINGPONG_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./pingpong-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".pingpong").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        {
            let system_config = PathBuf::from("/etc/pingpong/config.yaml");
            if system_config.exists() {
                return Some(system_config);
            }
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // An explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::debug!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("PINGPONG_STORE") {
            match val.to_lowercase().as_str() {
                "postgres" | "dsql" => self.spec.store.backend = StoreBackend::Postgres,
                "in-memory" | "memory" => self.spec.store.backend = StoreBackend::InMemory,
                _ => {
                    tracing::warn!(
                        "Invalid value for PINGPONG_STORE: '{}'. Expected postgres/in-memory. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("PINGPONG_IDLE_BACKOFF_MS") {
            match val.parse::<u64>() {
                Ok(ms) => {
                    tracing::info!("Environment override: PINGPONG_IDLE_BACKOFF_MS={}", ms);
                    self.spec.coordinator.idle_backoff_ms = ms;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for PINGPONG_IDLE_BACKOFF_MS: '{}'. Expected milliseconds. Ignoring.",
                        val
                    );
                }
            }
        }

        self.apply_password_override();
    }

    /// Apply `PINGPONG_DB_PASSWORD` to the postgres section, if there is one.
    pub fn apply_password_override(&mut self) {
        if let Ok(val) = std::env::var("PINGPONG_DB_PASSWORD") {
            if let Some(postgres) = self.spec.store.postgres.as_mut() {
                postgres.password = Some(val);
            }
        }
    }

    /// Logging settings from the explicit or discovered config file, read
    /// without emitting any log lines. Used before a subscriber exists.
    pub fn logging_settings(cli_path: Option<&Path>) -> LoggingConfig {
        let path = match cli_path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::discover_config(),
        };
        path.and_then(|path| Self::from_yaml_file(path).ok())
            .map(|config| config.logging())
            .unwrap_or_default()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let store = &self.spec.store;
        if store.table.is_empty() {
            anyhow::bail!("spec.store.table cannot be empty");
        }
        if !store
            .table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            anyhow::bail!(
                "spec.store.table '{}' may only contain ASCII letters, digits and '_'",
                store.table
            );
        }
        if store.key <= 0 {
            anyhow::bail!("spec.store.key must be positive, got {}", store.key);
        }

        if store.backend == StoreBackend::Postgres {
            match &store.postgres {
                None => anyhow::bail!("spec.store.postgres is required for the postgres backend"),
                Some(pg) if pg.host.is_empty() => {
                    anyhow::bail!("spec.store.postgres.host cannot be empty")
                }
                Some(pg) if pg.max_connections == 0 => {
                    anyhow::bail!("spec.store.postgres.max_connections must be at least 1")
                }
                Some(_) => {}
            }
        }

        if let Some(0) = self.spec.coordinator.max_moves {
            anyhow::bail!("spec.coordinator.max_moves must be at least 1 when set");
        }

        Ok(())
    }

    pub fn counter_key(&self) -> CounterKey {
        CounterKey(self.spec.store.key)
    }

    pub fn logging(&self) -> LoggingConfig {
        self.spec
            .observability
            .as_ref()
            .and_then(|o| o.logging.clone())
            .unwrap_or_default()
    }
}
