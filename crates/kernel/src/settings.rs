use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

const DEFAULT_ENV: &str = "local";
const ENV_VAR_NAME: &str = "MUX_ENV";
const CONFIG_DIR_ENV: &str = "MUX_CONFIG_DIR";
const ENV_PREFIX: &str = "MUX";

/// Deployment environment the application is running in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Staging,
    Production,
}

impl Environment {
    fn parse(name: &str) -> anyhow::Result<Self> {
        match name {
            "local" => Ok(Environment::Local),
            "staging" => Ok(Environment::Staging),
            "production" => Ok(Environment::Production),
            other => Err(anyhow!(
                "unsupported environment '{}'; expected local/staging/production",
                other
            )),
        }
    }
}

/// Top-level configuration structure loaded from layered sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

/// Variables honoured for compatibility with deployments that predate the
/// `MUX_` prefix.
#[derive(Debug, Clone, Default)]
pub struct LegacyEnv {
    pub port: Option<String>,
    pub mongodb_uri: Option<String>,
}

impl LegacyEnv {
    fn from_process() -> Self {
        Self {
            port: std::env::var("PORT")
                .or_else(|_| std::env::var("port"))
                .ok(),
            mongodb_uri: std::env::var("mongodb_uri").ok(),
        }
    }
}

impl Settings {
    /// Load configuration by layering `.env`, base file, environment overlay,
    /// `MUX_*` variables and finally the legacy `PORT`/`mongodb_uri` variables.
    pub fn load() -> anyhow::Result<Self> {
        // Allow missing `.env` files without failing.
        let _ = dotenvy::dotenv();

        let environment = std::env::var(ENV_VAR_NAME).unwrap_or_else(|_| DEFAULT_ENV.to_string());
        let config_dir = match std::env::var(CONFIG_DIR_ENV) {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => std::env::current_dir()
                .context("unable to resolve current directory")?
                .join("config"),
        };

        Self::load_from(&config_dir, &environment, LegacyEnv::from_process())
    }

    /// Load configuration from an explicit config directory and environment name.
    pub fn load_from(
        config_dir: &Path,
        environment: &str,
        legacy: LegacyEnv,
    ) -> anyhow::Result<Self> {
        let parsed_environment = Environment::parse(environment)?;

        let base_path = config_dir.join("base.toml");
        let environment_path = config_dir.join(format!("{}.toml", environment));

        let legacy_port = legacy
            .port
            .map(|raw| {
                raw.trim()
                    .parse::<u16>()
                    .with_context(|| format!("invalid PORT value '{}'", raw))
            })
            .transpose()?;

        let builder = config::Config::builder()
            .add_source(config::File::from(base_path).required(false))
            .add_source(config::File::from(environment_path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("server.port", legacy_port.map(i64::from))
            .with_context(|| "failed to apply PORT override")?
            .set_override_option("database.uri", legacy.mongodb_uri)
            .with_context(|| "failed to apply mongodb_uri override")?;

        let cfg = builder
            .build()
            .with_context(|| "failed to build configuration")?;

        let mut settings: Settings = cfg
            .try_deserialize()
            .with_context(|| "failed to deserialize configuration")?;

        settings.environment = parsed_environment;

        Ok(settings)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "ServerSettings::default_host")]
    pub host: String,
    #[serde(default = "ServerSettings::default_port")]
    pub port: u16,
    #[serde(default = "ServerSettings::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl ServerSettings {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_port() -> u16 {
        8000
    }

    fn default_request_timeout_ms() -> u64 {
        15000
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            request_timeout_ms: Self::default_request_timeout_ms(),
        }
    }
}

/// Which store backs the service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreEngine {
    #[default]
    Mongodb,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default)]
    pub engine: StoreEngine,
    #[serde(default = "DatabaseSettings::default_uri")]
    pub uri: String,
    /// Database used when the URI does not name one.
    #[serde(default = "DatabaseSettings::default_name")]
    pub name: String,
    #[serde(default = "DatabaseSettings::default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl DatabaseSettings {
    fn default_uri() -> String {
        "mongodb://127.0.0.1:27017/meet-mux".to_string()
    }

    fn default_name() -> String {
        "meet-mux".to_string()
    }

    fn default_connect_timeout_ms() -> u64 {
        5000
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            engine: StoreEngine::default(),
            uri: Self::default_uri(),
            name: Self::default_name(),
            connect_timeout_ms: Self::default_connect_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySettings {
    #[serde(default)]
    pub log_format: LogFormat,
    /// Default filter directive; `RUST_LOG` takes precedence when set.
    #[serde(default = "TelemetrySettings::default_log_level")]
    pub log_level: String,
}

impl TelemetrySettings {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            log_level: Self::default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn default_environment_is_local() {
        let settings = Settings::default();
        assert_eq!(settings.environment, Environment::Local);
    }

    #[test]
    fn defaults_match_legacy_deployment() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.database.uri, "mongodb://127.0.0.1:27017/meet-mux");
        assert_eq!(settings.database.engine, StoreEngine::Mongodb);
    }

    #[test]
    fn missing_config_dir_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(dir.path(), "local", LegacyEnv::default()).unwrap();
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.database.name, "meet-mux");
    }

    #[test]
    fn environment_file_overlays_base_file() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "base.toml",
            "[server]\nport = 9000\n[telemetry]\nlog_format = \"pretty\"\n",
        );
        write(
            dir.path(),
            "staging.toml",
            "[telemetry]\nlog_format = \"json\"\n",
        );

        let settings = Settings::load_from(dir.path(), "staging", LegacyEnv::default()).unwrap();
        assert_eq!(settings.environment, Environment::Staging);
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.telemetry.log_format, LogFormat::Json);
    }

    #[test]
    fn legacy_variables_win_over_files() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "base.toml",
            "[server]\nport = 9000\n[database]\nuri = \"mongodb://file/db\"\n",
        );
        let legacy = LegacyEnv {
            port: Some("7001".to_string()),
            mongodb_uri: Some("mongodb://legacy:27017/books".to_string()),
        };

        let settings = Settings::load_from(dir.path(), "local", legacy).unwrap();
        assert_eq!(settings.server.port, 7001);
        assert_eq!(settings.database.uri, "mongodb://legacy:27017/books");
    }

    #[test]
    fn invalid_legacy_port_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = LegacyEnv {
            port: Some("eighty".to_string()),
            mongodb_uri: None,
        };
        assert!(Settings::load_from(dir.path(), "local", legacy).is_err());
    }

    #[test]
    fn unknown_environment_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load_from(dir.path(), "qa", LegacyEnv::default()).unwrap_err();
        assert!(err.to_string().contains("unsupported environment"));
    }
}
