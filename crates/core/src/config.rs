use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
    /// SQLite `busy_timeout` pragma, applied per connection.
    pub busy_timeout_ms: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

/// Tunables for the suggestion pattern engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Patterns unused beyond this many days are eligible for the sweep.
    pub retention_days: u32,
    /// TTL for the context-keyed read cache.
    pub cache_ttl_secs: u64,
    /// Bounded queue depth for the online learner.
    pub learner_queue_capacity: usize,
    /// Per-upsert timeout on the learning path.
    pub learner_timeout_secs: u64,
    /// Request-scoped timeout for suggestion queries.
    pub query_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub retention_days: Option<u32>,
    pub cache_ttl_secs: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://cutplan.db".to_string(),
            max_connections: 5,
            timeout_secs: 30,
            busy_timeout_ms: 5_000,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            engine: EngineConfig {
                retention_days: 180,
                cache_ttl_secs: 30,
                learner_queue_capacity: 256,
                learner_timeout_secs: 5,
                query_timeout_secs: 5,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    engine: Option<EnginePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
    busy_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EnginePatch {
    retention_days: Option<u32>,
    cache_ttl_secs: Option<u64>,
    learner_queue_capacity: Option<usize>,
    learner_timeout_secs: Option<u64>,
    query_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl AppConfig {
    /// Defaults, then the optional TOML file, then `CUTPLAN_*` environment
    /// variables, then programmatic overrides; validated at the end.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("cutplan.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
            if let Some(busy_timeout_ms) = database.busy_timeout_ms {
                self.database.busy_timeout_ms = busy_timeout_ms;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(engine) = patch.engine {
            if let Some(retention_days) = engine.retention_days {
                self.engine.retention_days = retention_days;
            }
            if let Some(cache_ttl_secs) = engine.cache_ttl_secs {
                self.engine.cache_ttl_secs = cache_ttl_secs;
            }
            if let Some(learner_queue_capacity) = engine.learner_queue_capacity {
                self.engine.learner_queue_capacity = learner_queue_capacity;
            }
            if let Some(learner_timeout_secs) = engine.learner_timeout_secs {
                self.engine.learner_timeout_secs = learner_timeout_secs;
            }
            if let Some(query_timeout_secs) = engine.query_timeout_secs {
                self.engine.query_timeout_secs = query_timeout_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CUTPLAN_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("CUTPLAN_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("CUTPLAN_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("CUTPLAN_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("CUTPLAN_DATABASE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CUTPLAN_DATABASE_BUSY_TIMEOUT_MS") {
            self.database.busy_timeout_ms = parse_u64("CUTPLAN_DATABASE_BUSY_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = read_env("CUTPLAN_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CUTPLAN_SERVER_PORT") {
            self.server.port = parse_u16("CUTPLAN_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("CUTPLAN_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("CUTPLAN_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("CUTPLAN_ENGINE_RETENTION_DAYS") {
            self.engine.retention_days = parse_u32("CUTPLAN_ENGINE_RETENTION_DAYS", &value)?;
        }
        if let Some(value) = read_env("CUTPLAN_ENGINE_CACHE_TTL_SECS") {
            self.engine.cache_ttl_secs = parse_u64("CUTPLAN_ENGINE_CACHE_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("CUTPLAN_ENGINE_LEARNER_QUEUE_CAPACITY") {
            self.engine.learner_queue_capacity =
                parse_u32("CUTPLAN_ENGINE_LEARNER_QUEUE_CAPACITY", &value)? as usize;
        }
        if let Some(value) = read_env("CUTPLAN_ENGINE_LEARNER_TIMEOUT_SECS") {
            self.engine.learner_timeout_secs =
                parse_u64("CUTPLAN_ENGINE_LEARNER_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CUTPLAN_ENGINE_QUERY_TIMEOUT_SECS") {
            self.engine.query_timeout_secs =
                parse_u64("CUTPLAN_ENGINE_QUERY_TIMEOUT_SECS", &value)?;
        }

        let log_level = read_env("CUTPLAN_LOGGING_LEVEL").or_else(|| read_env("CUTPLAN_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CUTPLAN_LOGGING_FORMAT").or_else(|| read_env("CUTPLAN_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(retention_days) = overrides.retention_days {
            self.engine.retention_days = retention_days;
        }
        if let Some(cache_ttl_secs) = overrides.cache_ttl_secs {
            self.engine.cache_ttl_secs = cache_ttl_secs;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Validation("database.url must not be empty".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.server.bind_address.trim().is_empty() {
            return Err(ConfigError::Validation(
                "server.bind_address must not be empty".to_string(),
            ));
        }
        if self.engine.retention_days == 0 {
            return Err(ConfigError::Validation(
                "engine.retention_days must be at least 1".to_string(),
            ));
        }
        if self.engine.learner_queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "engine.learner_queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.engine.learner_timeout_secs == 0 || self.engine.query_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "engine timeouts must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }
    let default = PathBuf::from("cutplan.toml");
    default.exists().then_some(default)
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let config = AppConfig::load(LoadOptions::default()).expect("load defaults");
        assert_eq!(config.engine.retention_days, 180);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn toml_patch_overrides_engine_section() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "[database]\nbusy_timeout_ms = 1200\n\n[engine]\nretention_days = 90\ncache_ttl_secs = 10\n\n[logging]\nformat = \"json\""
        )
        .expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            ..LoadOptions::default()
        })
        .expect("load");

        assert_eq!(config.database.busy_timeout_ms, 1200);
        assert_eq!(config.engine.retention_days, 90);
        assert_eq!(config.engine.cache_ttl_secs, 10);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let result = AppConfig::load(LoadOptions {
            config_path: Some(PathBuf::from("/definitely/not/here.toml")),
            require_file: true,
            ..LoadOptions::default()
        });
        assert!(matches!(result, Err(ConfigError::MissingConfigFile(_))));
    }

    #[test]
    fn programmatic_overrides_win() {
        let config = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                retention_days: Some(30),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("load");

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.engine.retention_days, 30);
    }

    #[test]
    fn zero_retention_fails_validation() {
        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                retention_days: Some(0),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }
}
