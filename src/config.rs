//! Application configuration.
//!
//! Settings come from an optional YAML file named by `WAYPOINT_CONFIG`, then
//! environment overrides: `LISTEN` replaces the prefix list with a single
//! prefix (bare `host:port` is accepted) and `WAYPOINT_EXPOSE_ERRORS`
//! toggles fault details in 500 bodies.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

pub const CONFIG_ENV: &str = "WAYPOINT_CONFIG";
pub const LISTEN_ENV: &str = "LISTEN";
pub const EXPOSE_ERRORS_ENV: &str = "WAYPOINT_EXPOSE_ERRORS";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub prefixes: Vec<String>,
    pub read_timeout_secs: u64,
    pub max_request_bytes: usize,
    pub expose_error_details: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            prefixes: vec!["http://127.0.0.1:8080/".to_string()],
            read_timeout_secs: 30,
            max_request_bytes: 1024 * 1024,
            expose_error_details: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// The configured level, falling back to INFO when unparsable.
    pub fn max_level(&self) -> tracing::Level {
        self.level.parse().unwrap_or(tracing::Level::INFO)
    }
}

/// Environment values that override the file.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub listen: Option<String>,
    pub expose_errors: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            listen: std::env::var(LISTEN_ENV).ok(),
            expose_errors: std::env::var(EXPOSE_ERRORS_ENV).ok(),
        }
    }
}

impl Config {
    /// Loads from `WAYPOINT_CONFIG` (if set) and the process environment.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(CONFIG_ENV).ok();
        Self::load_with(path.as_deref().map(Path::new), EnvOverrides::from_env())
    }

    pub fn load_with(path: Option<&Path>, env: EnvOverrides) -> anyhow::Result<Self> {
        let mut cfg = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                Self::from_yaml_str(&text)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => Self::default(),
        };

        if let Some(listen) = env.listen.filter(|l| !l.trim().is_empty()) {
            cfg.server.prefixes = vec![normalize_listen(&listen)];
        }
        if let Some(flag) = env.expose_errors {
            cfg.server.expose_error_details = parse_flag(&flag)
                .with_context(|| format!("{} must be a boolean, got {:?}", EXPOSE_ERRORS_ENV, flag))?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml_str(text: &str) -> anyhow::Result<Self> {
        let cfg: Config = serde_yaml::from_str(text)?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.server.prefixes.is_empty() {
            anyhow::bail!("server.prefixes must list at least one prefix");
        }
        if self.server.max_request_bytes == 0 {
            anyhow::bail!("server.max_request_bytes must be positive");
        }
        Ok(())
    }
}

/// Turns `host:port` into `http://host:port/`; full prefixes pass through.
pub fn normalize_listen(listen: &str) -> String {
    let listen = listen.trim();
    let prefix = if listen.contains("://") {
        listen.to_string()
    } else {
        format!("http://{}", listen)
    };
    if prefix.ends_with('/') {
        prefix
    } else {
        format!("{}/", prefix)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
