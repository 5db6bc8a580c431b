//! Configuration parsing and structures

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::connector::proxy::ProxyConfig;
use crate::env::substitute_env_vars;
use crate::mount::MountKey;
use crate::pool::{PoolConfig, DEFAULT_INITIAL_SIZE, DEFAULT_MAX_SIZE};
use crate::registry::resolve::normalize_scheme;
use crate::registry::{Builder, FileSystemConfiguration, FileSystemRegistry};

// =============================================================================
// Raw Config (Deserialized from YAML)
// =============================================================================

/// Raw configuration as deserialized from YAML.
/// This is converted to `Config` via `resolve()`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Per-scheme defaults merged under every mount of that scheme
    #[serde(default)]
    pub defaults: HashMap<String, MountSettings>,

    /// Mounts, in registration order
    pub mounts: Vec<RawMountConfig>,
}

/// Raw mount configuration before resolution
#[derive(Debug, Clone, Deserialize)]
pub struct RawMountConfig {
    /// URI scheme (`sftp`, `s3`, `s3a`)
    pub scheme: String,

    /// Mount values; missing ones inherit from the scheme defaults
    #[serde(flatten)]
    pub settings: MountSettings,
}

/// Options shared by defaults and mounts - every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MountSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,

    #[serde(default, with = "humantime_serde")]
    pub connect_timeout: Option<Duration>,

    /// Session inactivity timeout
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,

    /// Private key for public-key authentication
    pub identity: Option<PathBuf>,
    pub passphrase: Option<String>,

    pub known_hosts: Option<PathBuf>,
    pub proxy: Option<ProxyConfig>,

    /// Backend-specific options (`StrictHostKeyChecking`, `region`, ...)
    #[serde(default)]
    pub options: BTreeMap<String, String>,

    pub default_dir: Option<String>,
    pub pool: Option<RawPoolConfig>,
    pub bucket: Option<String>,

    /// Endpoint protocol for S3 (`http` or `https`)
    pub protocol: Option<String>,
    pub path_style_access: Option<bool>,
}

/// Pool sizing where every field may be inherited
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPoolConfig {
    pub initial_size: Option<usize>,
    pub max_size: Option<usize>,

    #[serde(default, with = "humantime_serde")]
    pub max_wait: Option<Duration>,

    #[serde(default, with = "humantime_serde")]
    pub max_idle: Option<Duration>,
}

// =============================================================================
// Resolved Config (Ready for use)
// =============================================================================

/// Top-level configuration (resolved from RawConfig)
#[derive(Debug, Clone)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Mounts (fully resolved)
    pub mounts: Vec<MountConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Mount configuration with defaults merged in
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// Normalized scheme
    pub scheme: String,

    pub settings: MountSettings,

    /// Pool sizing (resolved from inheritance chain)
    pub pool: PoolConfig,
}

// =============================================================================
// Resolution Logic
// =============================================================================

impl MountSettings {
    /// Fill every unset field from `defaults`; options merge key by key
    fn inherit(self, defaults: &MountSettings) -> MountSettings {
        let mut options = defaults.options.clone();
        options.extend(self.options);

        let pool = match (self.pool, &defaults.pool) {
            (Some(mount), Some(defaults)) => Some(mount.inherit(defaults)),
            (Some(mount), None) => Some(mount),
            (None, defaults) => defaults.clone(),
        };

        MountSettings {
            host: self.host.or_else(|| defaults.host.clone()),
            port: self.port.or(defaults.port),
            username: self.username.or_else(|| defaults.username.clone()),
            password: self.password.or_else(|| defaults.password.clone()),
            connect_timeout: self.connect_timeout.or(defaults.connect_timeout),
            timeout: self.timeout.or(defaults.timeout),
            identity: self.identity.or_else(|| defaults.identity.clone()),
            passphrase: self.passphrase.or_else(|| defaults.passphrase.clone()),
            known_hosts: self.known_hosts.or_else(|| defaults.known_hosts.clone()),
            proxy: self.proxy.or_else(|| defaults.proxy.clone()),
            options,
            default_dir: self.default_dir.or_else(|| defaults.default_dir.clone()),
            pool,
            bucket: self.bucket.or_else(|| defaults.bucket.clone()),
            protocol: self.protocol.or_else(|| defaults.protocol.clone()),
            path_style_access: self.path_style_access.or(defaults.path_style_access),
        }
    }
}

impl RawPoolConfig {
    fn inherit(self, defaults: &RawPoolConfig) -> RawPoolConfig {
        RawPoolConfig {
            initial_size: self.initial_size.or(defaults.initial_size),
            max_size: self.max_size.or(defaults.max_size),
            max_wait: self.max_wait.or(defaults.max_wait),
            max_idle: self.max_idle.or(defaults.max_idle),
        }
    }

    fn resolve(&self) -> PoolConfig {
        PoolConfig {
            initial_size: self.initial_size.unwrap_or(DEFAULT_INITIAL_SIZE),
            max_size: self.max_size.unwrap_or(DEFAULT_MAX_SIZE),
            max_wait: self.max_wait,
            max_idle: self.max_idle,
        }
    }
}

impl RawConfig {
    /// Resolve raw config into final config by merging mount overrides with defaults
    pub fn resolve(self) -> Config {
        let RawConfig {
            logging,
            defaults,
            mounts,
        } = self;

        // Defaults written under an alias (s3a) apply to the canonical scheme
        let defaults: HashMap<String, MountSettings> = defaults
            .into_iter()
            .map(|(scheme, settings)| (normalize_scheme(&scheme), settings))
            .collect();

        let mounts = mounts
            .into_iter()
            .map(|raw| Self::resolve_mount(&defaults, raw))
            .collect();

        Config { logging, mounts }
    }

    fn resolve_mount(defaults: &HashMap<String, MountSettings>, raw: RawMountConfig) -> MountConfig {
        let scheme = normalize_scheme(raw.scheme.trim());
        let settings = match defaults.get(&scheme) {
            Some(scheme_defaults) => raw.settings.inherit(scheme_defaults),
            None => raw.settings,
        };
        let pool = settings
            .pool
            .as_ref()
            .map(RawPoolConfig::resolve)
            .unwrap_or_default();

        MountConfig {
            scheme,
            settings,
            pool,
        }
    }
}

impl MountConfig {
    /// Key this mount will be registered under
    pub fn key(&self) -> MountKey {
        MountKey::from_configuration(&self.configuration())
    }

    /// Options this entry mounts with, defaults filled in
    pub fn configuration(&self) -> FileSystemConfiguration {
        let scratch = FileSystemRegistry::empty();
        self.builder(&scratch).configuration()
    }

    /// Translate this entry into a registry builder
    pub fn builder<'r>(&self, registry: &'r FileSystemRegistry) -> Builder<'r> {
        let s = &self.settings;
        let mut builder = registry
            .builder(self.scheme.as_str())
            .options(s.options.clone())
            .pool_config(self.pool.clone());

        if let Some(host) = &s.host {
            builder = builder.host(host);
        }
        if let Some(port) = s.port {
            builder = builder.port(port);
        }
        if let Some(username) = &s.username {
            builder = builder.username(username);
        }
        if let Some(password) = &s.password {
            builder = builder.password(password);
        }
        if let Some(timeout) = s.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = s.timeout {
            builder = builder.timeout(timeout);
        }
        builder = match (&s.identity, &s.passphrase) {
            (Some(path), Some(passphrase)) => builder.identity_with_passphrase(path, passphrase),
            (Some(path), None) => builder.identity(path),
            (None, _) => builder,
        };
        if let Some(known_hosts) = &s.known_hosts {
            builder = builder.known_hosts(known_hosts);
        }
        if let Some(proxy) = &s.proxy {
            builder = builder.proxy(proxy.clone());
        }
        if let Some(dir) = &s.default_dir {
            builder = builder.default_dir(dir);
        }
        if let Some(bucket) = &s.bucket {
            builder = builder.bucket(bucket);
        }
        if let Some(protocol) = &s.protocol {
            builder = builder.protocol(protocol);
        }
        if let Some(enabled) = s.path_style_access {
            builder = builder.path_style_access(enabled);
        }
        builder
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a YAML string, substituting `${VAR}` references first
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let content = substitute_env_vars(content)?;
        let raw: RawConfig =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Ok(raw.resolve())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mounts.is_empty() {
            return Err(ConfigError::ValidationError(
                "At least one mount is required".to_string(),
            ));
        }

        let mut keys = HashSet::new();
        for (index, mount) in self.mounts.iter().enumerate() {
            if mount.scheme.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "Mount #{}: scheme cannot be empty",
                    index
                )));
            }

            let key = mount.key();
            if !keys.insert(key.clone()) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate mount: {}",
                    key
                )));
            }

            if mount.scheme == "s3" && key.bucket.is_none() {
                return Err(ConfigError::ValidationError(format!(
                    "Mount {}: S3 bucket cannot be empty",
                    key
                )));
            }

            mount.pool.validate().map_err(|e| {
                ConfigError::ValidationError(format!("Mount {}: {}", key, e))
            })?;
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}
