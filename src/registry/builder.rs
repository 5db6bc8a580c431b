//! Mount configuration accumulated by [`Builder`]

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::connector::proxy::ProxyConfig;
use crate::error::Result;
use crate::mount::MountEntry;
use crate::pool::PoolConfig;

use super::FileSystemRegistry;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 80;
pub const DEFAULT_PROTOCOL: &str = "https";

/// Private key used for public-key authentication
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub path: PathBuf,
    pub passphrase: Option<String>,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("path", &self.path)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Resolved options for one mount
///
/// Produced by [`Builder::configuration`]; immutable once a mount owns it.
#[derive(Clone, PartialEq, Eq)]
pub struct FileSystemConfiguration {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connect_timeout: Option<Duration>,
    pub timeout: Option<Duration>,
    pub identity: Option<Identity>,
    pub known_hosts: Option<PathBuf>,
    pub proxy: Option<ProxyConfig>,
    /// Backend-specific options, passed through verbatim
    pub options: BTreeMap<String, String>,
    pub default_dir: Option<String>,
    pub pool: PoolConfig,
    pub bucket: Option<String>,
    pub protocol: String,
    pub path_style_access: bool,
}

impl FileSystemConfiguration {
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}

impl fmt::Debug for FileSystemConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSystemConfiguration")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout", &self.connect_timeout)
            .field("timeout", &self.timeout)
            .field("identity", &self.identity)
            .field("known_hosts", &self.known_hosts)
            .field("proxy", &self.proxy)
            .field("options", &self.options)
            .field("default_dir", &self.default_dir)
            .field("pool", &self.pool)
            .field("bucket", &self.bucket)
            .field("protocol", &self.protocol)
            .field("path_style_access", &self.path_style_access)
            .finish()
    }
}

/// Fluent mount builder
///
/// Later calls overwrite earlier ones for the same option. Unset options
/// take their defaults when [`configuration`](Self::configuration) or
/// [`build`](Self::build) snapshots the builder.
pub struct Builder<'r> {
    registry: &'r FileSystemRegistry,
    scheme: String,
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    connect_timeout: Option<Duration>,
    timeout: Option<Duration>,
    identity: Option<Identity>,
    known_hosts: Option<PathBuf>,
    proxy: Option<ProxyConfig>,
    options: BTreeMap<String, String>,
    default_dir: Option<String>,
    pool: Option<PoolConfig>,
    bucket: Option<String>,
    protocol: Option<String>,
    path_style_access: Option<bool>,
}

impl<'r> Builder<'r> {
    pub(crate) fn new(registry: &'r FileSystemRegistry, scheme: impl Into<String>) -> Self {
        Self {
            registry,
            scheme: scheme.into(),
            host: None,
            port: None,
            username: None,
            password: None,
            connect_timeout: None,
            timeout: None,
            identity: None,
            known_hosts: None,
            proxy: None,
            options: BTreeMap::new(),
            default_dir: None,
            pool: None,
            bucket: None,
            protocol: None,
            path_style_access: None,
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn credentials(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username(username).password(password)
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Session inactivity timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn identity(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity = Some(Identity {
            path: path.into(),
            passphrase: None,
        });
        self
    }

    pub fn identity_with_passphrase(
        mut self,
        path: impl Into<PathBuf>,
        passphrase: impl Into<String>,
    ) -> Self {
        self.identity = Some(Identity {
            path: path.into(),
            passphrase: Some(passphrase.into()),
        });
        self
    }

    pub fn known_hosts(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts = Some(path.into());
        self
    }

    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Set one backend-specific option
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Merge backend-specific options over those already set
    pub fn options<I, K, V>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.options
            .extend(options.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn default_dir(mut self, dir: impl Into<String>) -> Self {
        self.default_dir = Some(dir.into());
        self
    }

    pub fn pool_config(mut self, pool: PoolConfig) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    pub fn path_style_access(mut self, enabled: bool) -> Self {
        self.path_style_access = Some(enabled);
        self
    }

    /// Snapshot the accumulated options, filling in defaults
    pub fn configuration(&self) -> FileSystemConfiguration {
        FileSystemConfiguration {
            scheme: super::resolve::normalize_scheme(&self.scheme),
            host: self.host.clone().unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: self.port.unwrap_or(DEFAULT_PORT),
            username: self.username.clone(),
            password: self.password.clone(),
            connect_timeout: self.connect_timeout,
            timeout: self.timeout,
            identity: self.identity.clone(),
            known_hosts: self.known_hosts.clone(),
            proxy: self.proxy.clone(),
            options: self.options.clone(),
            default_dir: self.default_dir.clone(),
            pool: self.pool.clone().unwrap_or_default(),
            bucket: self.bucket.clone(),
            protocol: self
                .protocol
                .clone()
                .unwrap_or_else(|| DEFAULT_PROTOCOL.to_string()),
            path_style_access: self.path_style_access.unwrap_or(true),
        }
    }

    /// Construct the backend and register it with the registry
    pub async fn build(self) -> Result<Arc<MountEntry>> {
        let config = self.configuration();
        debug!("Building {} mount for {}:{}", config.scheme, config.host, config.port);
        self.registry.mount(config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let registry = FileSystemRegistry::empty();
        let config = registry.builder("sftp").configuration();

        assert_eq!(config.scheme, "sftp");
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 80);
        assert_eq!(config.protocol, "https");
        assert!(config.path_style_access);
        assert_eq!(config.pool, PoolConfig::new(5, 10));
        assert_eq!(config.pool.max_wait, None);
        assert_eq!(config.pool.max_idle, None);
        assert!(config.username.is_none());
        assert!(config.bucket.is_none());
    }

    #[test]
    fn test_later_calls_overwrite_earlier_ones() {
        let registry = FileSystemRegistry::empty();
        let config = registry
            .builder("S3A")
            .host("a.example")
            .host("b.example")
            .port(9000)
            .option("region", "us-east-1")
            .options([("region", "eu-west-1"), ("StrictHostKeyChecking", "no")])
            .identity("/keys/one")
            .identity_with_passphrase("/keys/two", "secret")
            .path_style_access(false)
            .configuration();

        assert_eq!(config.scheme, "s3");
        assert_eq!(config.host, "b.example");
        assert_eq!(config.port, 9000);
        assert_eq!(config.option("region"), Some("eu-west-1"));
        assert_eq!(config.option("StrictHostKeyChecking"), Some("no"));
        assert_eq!(
            config.identity,
            Some(Identity {
                path: PathBuf::from("/keys/two"),
                passphrase: Some("secret".to_string()),
            })
        );
        assert!(!config.path_style_access);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let registry = FileSystemRegistry::empty();
        let config = registry
            .builder("sftp")
            .credentials("deploy", "hunter2")
            .identity_with_passphrase("/k", "opensesame")
            .configuration();

        let rendered = format!("{:?}", config);
        assert!(rendered.contains("deploy"));
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("opensesame"));
    }
}
