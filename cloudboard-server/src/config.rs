//! Configuration system for the CloudBoard server.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/cloudboard/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;

/// Built-in session secret used when none is configured.
///
/// Fine for local development; `main` warns loudly when it is in use.
pub const DEV_SESSION_SECRET: &str = "cloudboard-dev-secret";

/// Default session token lifetime: 7 days, matching the original cookie TTL.
const DEFAULT_SESSION_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Errors that can occur when loading server configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerFileConfig,
    auth: AuthFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
    frontend_origin: Option<String>,
}

/// `[auth]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct AuthFileConfig {
    session_secret: Option<String>,
    session_ttl_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the CloudBoard server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "CloudBoard API and realtime gateway server")]
pub struct CliArgs {
    /// Address to bind the server to.
    #[arg(short, long, env = "CLOUDBOARD_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/cloudboard/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Browser origin allowed by CORS (the frontend URL).
    #[arg(long, env = "CLOUDBOARD_FRONTEND_ORIGIN")]
    pub frontend_origin: Option<String>,

    /// Secret used to sign session tokens.
    #[arg(long, env = "CLOUDBOARD_SESSION_SECRET", hide_env_values = true)]
    pub session_secret: Option<String>,

    /// Session token lifetime in seconds.
    #[arg(long)]
    pub session_ttl_secs: Option<u64>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "CLOUDBOARD_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to (e.g., `0.0.0.0:4000`).
    pub bind_addr: String,
    /// Browser origin allowed by CORS.
    pub frontend_origin: String,
    /// Secret used to sign session tokens.
    pub session_secret: String,
    /// Session token lifetime in seconds.
    pub session_ttl_secs: u64,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:4000".to_string(),
            frontend_origin: "http://localhost:5173".to_string(),
            session_secret: DEV_SESSION_SECRET.to_string(),
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and a missing
    /// file is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Returns `true` when the resolved secret is the built-in dev secret.
    #[must_use]
    pub fn uses_dev_secret(&self) -> bool {
        self.session_secret == DEV_SESSION_SECRET
    }

    /// Resolve a `ServerConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| file.server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            frontend_origin: cli
                .frontend_origin
                .clone()
                .or_else(|| file.server.frontend_origin.clone())
                .unwrap_or(defaults.frontend_origin),
            session_secret: cli
                .session_secret
                .clone()
                .or_else(|| file.auth.session_secret.clone())
                .unwrap_or(defaults.session_secret),
            session_ttl_secs: cli
                .session_ttl_secs
                .or(file.auth.session_ttl_secs)
                .unwrap_or(defaults.session_ttl_secs),
            log_level: cli.log_level.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("cloudboard").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
