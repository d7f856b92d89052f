//! Settings for the server, logging, the data backend and the query cache.
//!
//! Sources apply in order: config files, `FOLIO__*` environment variables,
//! then `serve` flags. Raw optional values are validated into [`Settings`].

mod cli;

use std::{net::SocketAddr, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

pub use cli::{CliArgs, Command, ServeArgs, ServeOverrides};

use crate::presentation::routes::normalize_prefix;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "folio";
const ENV_PREFIX: &str = "FOLIO";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_ADMIN_PREFIX: &str = "/admin";
const DEFAULT_GC_IDLE_SECS: u64 = 300;

/// Validated settings the binary runs with.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub remote: RemoteSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
    /// Normalised as `/segment`, no trailing slash.
    pub admin_prefix: String,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct RemoteSettings {
    /// Hosted backend; `None` selects the in-memory backend.
    pub backend: Option<RemoteBackend>,
    pub memory_admin: Option<MemoryAdmin>,
}

#[derive(Debug, Clone)]
pub struct RemoteBackend {
    pub url: Url,
    pub anon_key: String,
}

/// Credentials accepted by the in-memory backend's sign-in.
#[derive(Clone)]
pub struct MemoryAdmin {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for MemoryAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAdmin")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub gc_idle: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Merge every source and validate the result.
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::CheckConfig) | None => {}
    }

    Settings::from_raw(raw)
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    remote: RawRemoteSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(prefix) = overrides.server_admin_prefix.as_ref() {
            self.server.admin_prefix = Some(prefix.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.remote_url.as_ref() {
            self.remote.url = Some(url.clone());
        }
        if let Some(key) = overrides.remote_anon_key.as_ref() {
            self.remote.anon_key = Some(key.clone());
        }
        if let Some(seconds) = overrides.cache_gc_idle_seconds {
            self.cache.gc_idle_seconds = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            remote,
            cache,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            remote: build_remote_settings(remote)?,
            cache: build_cache_settings(cache)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    let raw_prefix = server
        .admin_prefix
        .unwrap_or_else(|| DEFAULT_ADMIN_PREFIX.to_string());
    if raw_prefix.trim().trim_matches('/').is_empty() {
        return Err(LoadError::invalid(
            "server.admin_prefix",
            "admin console cannot be mounted at the site root",
        ));
    }
    if raw_prefix
        .chars()
        .any(|ch| ch.is_whitespace() || matches!(ch, '?' | '#' | '{' | '}' | '*'))
    {
        return Err(LoadError::invalid(
            "server.admin_prefix",
            format!("`{raw_prefix}` is not a plain path"),
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
        admin_prefix: normalize_prefix(&raw_prefix),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn build_remote_settings(remote: RawRemoteSettings) -> Result<RemoteSettings, LoadError> {
    let backend = match non_empty(remote.url) {
        Some(raw_url) => {
            let url = Url::parse(&raw_url).map_err(|err| {
                LoadError::invalid("remote.url", format!("invalid url `{raw_url}`: {err}"))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(LoadError::invalid(
                    "remote.url",
                    format!("unsupported scheme `{}`", url.scheme()),
                ));
            }
            let anon_key = non_empty(remote.anon_key).ok_or_else(|| {
                LoadError::invalid("remote.anon_key", "required when remote.url is set")
            })?;
            Some(RemoteBackend { url, anon_key })
        }
        None => None,
    };

    let memory_admin = match (
        non_empty(remote.memory_admin_email),
        remote.memory_admin_password.filter(|value| !value.is_empty()),
    ) {
        (Some(email), Some(password)) => Some(MemoryAdmin { email, password }),
        (None, None) => None,
        (Some(_), None) => {
            return Err(LoadError::invalid(
                "remote.memory_admin_password",
                "required when remote.memory_admin_email is set",
            ));
        }
        (None, Some(_)) => {
            return Err(LoadError::invalid(
                "remote.memory_admin_email",
                "required when remote.memory_admin_password is set",
            ));
        }
    };

    Ok(RemoteSettings {
        backend,
        memory_admin,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let seconds = cache.gc_idle_seconds.unwrap_or(DEFAULT_GC_IDLE_SECS);
    if seconds == 0 {
        return Err(LoadError::invalid(
            "cache.gc_idle_seconds",
            "must be greater than zero",
        ));
    }
    Ok(CacheSettings {
        gc_idle: Duration::from_secs(seconds),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
    admin_prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRemoteSettings {
    url: Option<String>,
    anon_key: Option<String>,
    memory_admin_email: Option<String>,
    memory_admin_password: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    gc_idle_seconds: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}
