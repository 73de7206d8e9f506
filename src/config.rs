use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub openai: OpenAiSettings,
    pub database: DatabaseSettings,
    pub idempotency: IdempotencySettings,
    pub matching: MatchingSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            workers: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub base_url: String,
    pub extraction_model: String,
    pub embedding_model: String,
    /// Must match the `vector(..)` column width in the database
    pub embedding_dimensions: usize,
    pub request_timeout_secs: u64,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            extraction_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimensions: 384,
            request_timeout_secs: 30,
        }
    }
}

impl OpenAiSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// In-memory stores are used when unset
    pub url: Option<String>,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdempotencySettings {
    /// The in-process store is used when unset
    pub redis_url: Option<String>,
    pub in_flight_ttl_secs: u64,
    pub processed_ttl_secs: u64,
    /// Initial table size of the in-process store. Marks are never evicted by size.
    pub capacity: u64,
}

impl Default for IdempotencySettings {
    fn default() -> Self {
        Self {
            redis_url: None,
            in_flight_ttl_secs: 300,
            processed_ttl_secs: 7 * 24 * 3600,
            capacity: 100_000,
        }
    }
}

impl IdempotencySettings {
    pub fn in_flight_ttl(&self) -> Duration {
        Duration::from_secs(self.in_flight_ttl_secs)
    }

    pub fn processed_ttl(&self) -> Duration {
        Duration::from_secs(self.processed_ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchingSettings {
    pub top_k: usize,
    pub similarity_threshold: f64,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            top_k: crate::core::DEFAULT_TOP_K,
            similarity_threshold: crate::core::DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Environment variables (prefixed with LUME__)
    /// 4. Well-known variables: OPENAI_API_KEY, DATABASE_URL, REDIS_URL
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., LUME__MATCHING__TOP_K -> matching.top_k
            .add_source(
                Environment::with_prefix("LUME")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings = substitute_env_vars(settings)?;

        settings.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("LUME")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        substitute_env_vars(settings)?.try_deserialize()
    }
}

/// Keys set by the conventional unprefixed variables
const WELL_KNOWN_VARS: &[(&str, &str)] = &[
    ("OPENAI_API_KEY", "openai.api_key"),
    ("DATABASE_URL", "database.url"),
    ("REDIS_URL", "idempotency.redis_url"),
];

fn substitute_env_vars(settings: Config) -> Result<Config, ConfigError> {
    let mut builder = Config::builder().add_source(settings);

    for (var, key) in WELL_KNOWN_VARS {
        if let Ok(value) = std::env::var(var) {
            if !value.trim().is_empty() {
                builder = builder.set_override(*key, value)?;
            }
        }
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.matching.top_k, 2);
        assert_eq!(settings.matching.similarity_threshold, 0.7);
        assert!(settings.database.url.is_none());
        assert!(settings.idempotency.redis_url.is_none());
        assert!(settings.idempotency.processed_ttl() > settings.idempotency.in_flight_ttl());
    }

    #[test]
    fn test_default_logging() {
        let level = default_log_level();
        let format = default_log_format();
        assert_eq!(level, "info");
        assert_eq!(format, "json");
    }

    #[test]
    fn test_load_from_file_keeps_missing_defaults() {
        let path = std::env::temp_dir().join(format!("lume-intake-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[matching]\nsimilarity_threshold = 0.8\n\n[server]\nport = 9000").unwrap();

        let settings = Settings::load_from(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(settings.matching.similarity_threshold, 0.8);
        assert_eq!(settings.matching.top_k, 2);
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "0.0.0.0");
    }
}
