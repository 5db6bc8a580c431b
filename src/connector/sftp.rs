//! SFTP connector implementation
//!
//! Each mount owns a [`ResourcePool`] of authenticated SSH sessions, each
//! carrying one SFTP subsystem channel. Operations lease a channel for their
//! duration and hand it back afterwards.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_stream::try_stream;
use async_trait::async_trait;
use bytes::Bytes;
use russh::client::{self, Handle};
use russh::keys::{check_known_hosts_path, load_secret_key, HashAlg, PrivateKeyWithHashAlg, PublicKey};
use russh::Disconnect;
use russh_sftp::client::error::Error as SftpError;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::FileAttributes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, trace, warn};

use crate::connector::{
    epoch_secs, DirEntry, DirEntryStream, FileSystem, FileSystemProvider, FileType, Metadata,
};
use crate::error::{ConnectError, Result, VfsError};
use crate::pool::{ChannelFactory, Lease, ResourcePool};
use crate::registry::FileSystemConfiguration;
use crate::translate::{self, StatusCode, StatusError};

/// Sub-option keys understood by the SFTP connector
const OPT_STRICT_HOST_KEY_CHECKING: &str = "StrictHostKeyChecking";
const OPT_SERVER_ALIVE_INTERVAL: &str = "ServerAliveInterval";
const OPT_SERVER_ALIVE_COUNT_MAX: &str = "ServerAliveCountMax";

const DEFAULT_KEEPALIVE_MAX: usize = 3;

/// SSH settings taken from the mount's sub-options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SshOptions {
    /// `Some(true)` for `yes`, `Some(false)` for `no`, `None` otherwise
    pub strict_host_key_checking: Option<bool>,
    pub keepalive_interval: Option<Duration>,
    pub keepalive_max: Option<usize>,
}

impl SshOptions {
    pub fn from_options(options: &BTreeMap<String, String>) -> Self {
        let mut parsed = Self::default();
        for (key, value) in options {
            match key.as_str() {
                OPT_STRICT_HOST_KEY_CHECKING => {
                    parsed.strict_host_key_checking = match value.to_ascii_lowercase().as_str() {
                        "yes" => Some(true),
                        "no" => Some(false),
                        _ => None,
                    }
                }
                OPT_SERVER_ALIVE_INTERVAL => match value.parse::<u64>() {
                    Ok(0) => {}
                    Ok(secs) => parsed.keepalive_interval = Some(Duration::from_secs(secs)),
                    Err(_) => warn!("Ignoring non-numeric {}={}", key, value),
                },
                OPT_SERVER_ALIVE_COUNT_MAX => match value.parse::<usize>() {
                    Ok(count) => parsed.keepalive_max = Some(count),
                    Err(_) => warn!("Ignoring non-numeric {}={}", key, value),
                },
                _ => debug!("SFTP option {}={} has no effect", key, value),
            }
        }
        parsed
    }

    fn client_config(&self, inactivity_timeout: Option<Duration>) -> client::Config {
        client::Config {
            inactivity_timeout,
            keepalive_interval: self.keepalive_interval,
            keepalive_max: self.keepalive_max.unwrap_or(DEFAULT_KEEPALIVE_MAX),
            ..<_>::default()
        }
    }
}

/// Outcome of looking the server key up in known_hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownHost {
    NotConfigured,
    Match,
    Unknown,
    Mismatch,
}

/// Whether to trust a server key
pub fn accept_host_key(strict: Option<bool>, known: KnownHost) -> bool {
    match known {
        KnownHost::Match => true,
        KnownHost::Mismatch => false,
        KnownHost::NotConfigured => strict != Some(true),
        KnownHost::Unknown => strict == Some(false),
    }
}

/// Client handler for russh - verifies the server key
struct SessionHandler {
    host: String,
    port: u16,
    known_hosts: Option<PathBuf>,
    strict: Option<bool>,
}

impl client::Handler for SessionHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint(HashAlg::Sha256);

        let known = match &self.known_hosts {
            None => KnownHost::NotConfigured,
            Some(path) => match check_known_hosts_path(&self.host, self.port, server_public_key, path) {
                Ok(true) => KnownHost::Match,
                Ok(false) => KnownHost::Unknown,
                Err(e) => {
                    warn!("known_hosts check for {}:{} failed: {}", self.host, self.port, e);
                    KnownHost::Mismatch
                }
            },
        };

        let accepted = accept_host_key(self.strict, known);
        match (accepted, known) {
            (true, KnownHost::Match) => {
                trace!("Host key {} for {}:{} verified", fingerprint, self.host, self.port)
            }
            (true, _) => warn!(
                "Accepting unverified host key {} for {}:{}",
                fingerprint, self.host, self.port
            ),
            (false, _) => warn!(
                "Rejecting host key {} for {}:{} ({:?})",
                fingerprint, self.host, self.port, known
            ),
        }
        Ok(accepted)
    }
}

/// One authenticated SSH session with its SFTP channel
pub struct SftpChannel {
    session: Handle<SessionHandler>,
    sftp: SftpSession,
}

impl SftpChannel {
    pub fn is_closed(&self) -> bool {
        self.session.is_closed()
    }

    async fn read_file(&self, path: &str) -> std::result::Result<Vec<u8>, OpError> {
        let mut file = self.sftp.open(path).await?;
        let mut data = Vec::new();
        file.read_to_end(&mut data).await?;
        Ok(data)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> std::result::Result<(), OpError> {
        let mut file = self.sftp.create(path).await?;
        file.write_all(data).await?;
        file.shutdown().await?;
        Ok(())
    }

    async fn copy_file(&self, from: &str, to: &str) -> std::result::Result<(), OpError> {
        let data = self.read_file(from).await?;
        self.write_file(to, &data).await
    }

    /// Read-modify-write of the attributes SFTP v3 only sets in pairs
    async fn update_attributes<F>(&self, path: &str, update: F) -> std::result::Result<(), OpError>
    where
        F: FnOnce(&FileAttributes) -> FileAttributes + Send,
    {
        let current = self.sftp.metadata(path).await?;
        self.sftp.set_metadata(path, update(&current)).await?;
        Ok(())
    }
}

/// Failure of one leased operation
enum OpError {
    Sftp(SftpError),
    Io(io::Error),
}

impl From<SftpError> for OpError {
    fn from(e: SftpError) -> Self {
        OpError::Sftp(e)
    }
}

impl From<io::Error> for OpError {
    fn from(e: io::Error) -> Self {
        OpError::Io(e)
    }
}

impl OpError {
    /// Status to report, and whether the channel may be reused
    fn classify(self) -> (StatusError, bool) {
        match self {
            OpError::Sftp(SftpError::Status(status)) => {
                let code = StatusCode::from(status.status_code);
                let reusable = !code.is_connection_failure();
                (StatusError::new(code, status.error_message), reusable)
            }
            OpError::Sftp(other) => (
                StatusError::new(StatusCode::ConnectionLost, other.to_string()),
                false,
            ),
            OpError::Io(e) => (StatusError::new(StatusCode::Failure, e.to_string()), false),
        }
    }
}

/// Creates pooled SFTP channels for one mount
pub struct SftpChannelFactory {
    config: FileSystemConfiguration,
    options: SshOptions,
    ssh: Arc<client::Config>,
}

impl SftpChannelFactory {
    pub fn new(config: FileSystemConfiguration) -> Self {
        let options = SshOptions::from_options(&config.options);
        let ssh = Arc::new(options.client_config(config.timeout));
        Self {
            config,
            options,
            ssh,
        }
    }

    pub fn options(&self) -> &SshOptions {
        &self.options
    }

    fn error(&self, source: impl Into<crate::error::BoxError>) -> ConnectError {
        ConnectError::new(&self.config.host, self.config.port, source)
    }

    async fn connect(&self) -> std::result::Result<SftpChannel, ConnectError> {
        let host = self.config.host.as_str();
        let port = self.config.port;

        let handler = SessionHandler {
            host: host.to_string(),
            port,
            known_hosts: self.config.known_hosts.clone(),
            strict: self.options.strict_host_key_checking,
        };

        let mut session = match &self.config.proxy {
            Some(proxy) => {
                let stream = proxy.tunnel(host, port).await.map_err(|e| self.error(e))?;
                client::connect_stream(self.ssh.clone(), stream, handler).await
            }
            None => client::connect(self.ssh.clone(), (host, port), handler).await,
        }
        .map_err(|e| self.error(e))?;

        self.authenticate(&mut session).await?;

        let channel = session
            .channel_open_session()
            .await
            .map_err(|e| self.error(e))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| self.error(e))?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| self.error(e))?;

        debug!("Opened SFTP channel to {}:{}", host, port);
        Ok(SftpChannel { session, sftp })
    }

    async fn authenticate(
        &self,
        session: &mut Handle<SessionHandler>,
    ) -> std::result::Result<(), ConnectError> {
        let username = self
            .config
            .username
            .as_deref()
            .ok_or_else(|| self.error("no username configured"))?;

        if let Some(identity) = &self.config.identity {
            let key = load_secret_key(&identity.path, identity.passphrase.as_deref())
                .map_err(|e| self.error(format!("failed to load {}: {}", identity.path.display(), e)))?;
            let hash_alg = session
                .best_supported_rsa_hash()
                .await
                .ok()
                .flatten()
                .flatten();

            let result = session
                .authenticate_publickey(username, PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg))
                .await
                .map_err(|e| self.error(e))?;
            if result.success() {
                debug!("Authenticated as {} with key {}", username, identity.path.display());
                return Ok(());
            }
            debug!("Key {} rejected for {}", identity.path.display(), username);
        }

        if let Some(password) = &self.config.password {
            let result = session
                .authenticate_password(username, password)
                .await
                .map_err(|e| self.error(e))?;
            if result.success() {
                debug!("Authenticated as {} with password", username);
                return Ok(());
            }
        }

        Err(self.error(format!("authentication failed for user {}", username)))
    }
}

#[async_trait]
impl ChannelFactory for SftpChannelFactory {
    type Channel = SftpChannel;
    type Error = ConnectError;

    async fn create(&self) -> std::result::Result<SftpChannel, ConnectError> {
        match self.config.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, self.connect())
                .await
                .map_err(|_| self.error(format!("connect timed out after {:?}", limit)))?,
            None => self.connect().await,
        }
    }

    async fn destroy(&self, channel: SftpChannel) -> std::result::Result<(), ConnectError> {
        if channel.is_closed() {
            return Ok(());
        }
        if let Err(e) = channel.sftp.close().await {
            debug!("SFTP close on {}:{} failed: {}", self.config.host, self.config.port, e);
        }
        channel
            .session
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| self.error(e))
    }
}

type SftpPool = ResourcePool<SftpChannelFactory>;

/// Return a lease to the pool according to how the operation ended
async fn settle<T>(
    pool: &SftpPool,
    lease: Lease<SftpChannel>,
    result: std::result::Result<T, OpError>,
) -> std::result::Result<T, StatusError> {
    match result {
        Ok(value) => {
            pool.release(lease).await;
            Ok(value)
        }
        Err(e) => {
            let (status, reusable) = e.classify();
            if reusable {
                pool.release(lease).await;
            } else {
                debug!("Discarding SFTP channel after {}", status);
                pool.discard(lease).await;
            }
            Err(status)
        }
    }
}

fn to_metadata(attrs: &FileAttributes) -> Metadata {
    let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(attrs.mtime.unwrap_or(0) as u64);
    let file_type = match attrs.permissions {
        Some(mode) => Metadata::file_type_from_mode(mode),
        None if attrs.is_dir() => FileType::Directory,
        None => FileType::File,
    };

    let mut meta = match file_type {
        FileType::Directory => Metadata::directory(mtime),
        _ => Metadata::file(attrs.size.unwrap_or(0), mtime),
    };
    meta.file_type = file_type;
    meta.uid = attrs.uid;
    meta.gid = attrs.gid;
    match attrs.permissions {
        Some(mode) => meta.with_mode(mode),
        None => meta,
    }
}

/// Join a possibly relative path onto the mount's working directory
fn absolute(home: Option<&str>, path: &str) -> String {
    match home {
        Some(home) if !path.starts_with('/') => {
            let base = home.trim_end_matches('/');
            if path.is_empty() || path == "." {
                format!("{}/", base)
            } else {
                format!("{}/{}", base, path)
            }
        }
        _ => path.to_string(),
    }
}

/// SFTP-backed filesystem
pub struct SftpFileSystem {
    config: FileSystemConfiguration,
    pool: Arc<SftpPool>,
    home: Option<String>,
}

impl SftpFileSystem {
    /// Build the pool, open the initial channels and validate `default_dir`
    pub async fn new(config: FileSystemConfiguration) -> Result<Self> {
        let factory = SftpChannelFactory::new(config.clone());
        let pool = ResourcePool::new(factory, config.pool.clone()).map_err(VfsError::Config)?;

        let mut filesystem = Self {
            config,
            pool: Arc::new(pool),
            home: None,
        };

        if let Err(e) = filesystem.pool.warm_up().await {
            filesystem.abandon().await;
            return Err(e.into());
        }

        if let Some(dir) = filesystem.config.default_dir.clone() {
            let home = match filesystem.change_dir(&dir).await {
                Ok(home) => home,
                Err(e) => {
                    filesystem.abandon().await;
                    return Err(e);
                }
            };
            debug!("Working directory for {} is {}", filesystem.config.host, home);
            filesystem.home = Some(home);
        }

        Ok(filesystem)
    }

    /// Tear down a pool whose mount never completed
    async fn abandon(&self) {
        if let Err(e) = self.pool.close().await {
            debug!("Closing pool after failed mount of {}: {}", self.config.host, e);
        }
    }

    pub fn pool(&self) -> &SftpPool {
        &self.pool
    }

    fn resolve(&self, path: &str) -> String {
        absolute(self.home.as_deref(), path)
    }
}

#[async_trait]
impl FileSystem for SftpFileSystem {
    fn scheme(&self) -> &str {
        &self.config.scheme
    }

    fn configuration(&self) -> &FileSystemConfiguration {
        &self.config
    }

    async fn stat(&self, path: &str) -> Result<Metadata> {
        let path = self.resolve(path);
        trace!("stat: path={}", path);

        let lease = self.pool.acquire().await?;
        let result = lease.sftp.metadata(path.as_str()).await.map_err(OpError::from);
        let attrs = settle(&self.pool, lease, result)
            .await
            .map_err(|e| translate::stat(&path, e))?;
        Ok(to_metadata(&attrs))
    }

    fn list_dir(&self, path: &str) -> DirEntryStream {
        let path = self.resolve(path);
        let pool = self.pool.clone();

        Box::pin(try_stream! {
            trace!("list_dir: path={}", path);
            let lease = pool.acquire().await.map_err(VfsError::from)?;
            let result = lease.sftp.read_dir(path.as_str()).await.map_err(OpError::from);
            let entries = settle(&pool, lease, result)
                .await
                .map_err(|e| translate::list(&path, e))?;

            for entry in entries {
                let name = entry.file_name();
                if name == "." || name == ".." {
                    continue;
                }
                let file_type = if entry.file_type().is_dir() {
                    FileType::Directory
                } else if entry.file_type().is_symlink() {
                    FileType::Symlink
                } else {
                    FileType::File
                };
                yield DirEntry { name, file_type };
            }
        })
    }

    async fn read_link(&self, path: &str) -> Result<String> {
        let path = self.resolve(path);
        let lease = self.pool.acquire().await?;
        let result = lease.sftp.read_link(path.as_str()).await.map_err(OpError::from);
        settle(&self.pool, lease, result)
            .await
            .map_err(|e| translate::read_link(&path, e))
    }

    async fn change_dir(&self, path: &str) -> Result<String> {
        let path = self.resolve(path);
        let lease = self.pool.acquire().await?;
        let result = async {
            let canonical = lease.sftp.canonicalize(path.as_str()).await?;
            let attrs = lease.sftp.metadata(canonical.as_str()).await?;
            Ok::<_, SftpError>((canonical, attrs.is_dir()))
        }
        .await
        .map_err(OpError::from);

        let (canonical, is_dir) = settle(&self.pool, lease, result)
            .await
            .map_err(|e| translate::change_dir(&path, e))?;
        if !is_dir {
            return Err(translate::change_dir(
                &path,
                StatusError::new(StatusCode::Failure, "not a directory"),
            ));
        }
        Ok(canonical)
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        let path = self.resolve(path);
        debug!("create_dir: path={}", path);
        let lease = self.pool.acquire().await?;
        let result = lease.sftp.create_dir(path.as_str()).await.map_err(OpError::from);
        settle(&self.pool, lease, result)
            .await
            .map_err(|e| translate::create_dir(&path, e))
    }

    async fn remove(&self, path: &str, is_dir: bool) -> Result<()> {
        let path = self.resolve(path);
        debug!("remove: path={} is_dir={}", path, is_dir);
        let lease = self.pool.acquire().await?;
        let removed = if is_dir {
            lease.sftp.remove_dir(path.as_str()).await
        } else {
            lease.sftp.remove_file(path.as_str()).await
        };
        let result = removed.map_err(OpError::from);
        settle(&self.pool, lease, result)
            .await
            .map_err(|e| translate::delete(&path, is_dir, e))
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        let path = self.resolve(path);
        trace!("read: path={}", path);
        let lease = self.pool.acquire().await?;
        let result = lease.read_file(&path).await;
        let data = settle(&self.pool, lease, result)
            .await
            .map_err(|e| translate::read(&path, e))?;
        Ok(Bytes::from(data))
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let path = self.resolve(path);
        debug!("write: path={} size={}", path, data.len());
        let lease = self.pool.acquire().await?;
        let result = lease.write_file(&path, data).await;
        settle(&self.pool, lease, result)
            .await
            .map_err(|e| translate::write(&path, e))
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        let (from, to) = (self.resolve(from), self.resolve(to));
        debug!("copy: from={} to={}", from, to);
        let lease = self.pool.acquire().await?;
        let result = lease.copy_file(&from, &to).await;
        settle(&self.pool, lease, result)
            .await
            .map_err(|e| translate::copy(&from, &to, e))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let (from, to) = (self.resolve(from), self.resolve(to));
        debug!("rename: from={} to={}", from, to);
        let lease = self.pool.acquire().await?;
        let result = lease.sftp.rename(from.as_str(), to.as_str()).await.map_err(OpError::from);
        settle(&self.pool, lease, result)
            .await
            .map_err(|e| translate::rename(&from, &to, e))
    }

    async fn set_owner(&self, path: &str, uid: u32) -> Result<()> {
        let path = self.resolve(path);
        let lease = self.pool.acquire().await?;
        let result = lease
            .update_attributes(&path, |current| FileAttributes {
                uid: Some(uid),
                gid: current.gid,
                ..FileAttributes::empty()
            })
            .await;
        settle(&self.pool, lease, result)
            .await
            .map_err(|e| translate::set_owner(&path, e))
    }

    async fn set_group(&self, path: &str, gid: u32) -> Result<()> {
        let path = self.resolve(path);
        let lease = self.pool.acquire().await?;
        let result = lease
            .update_attributes(&path, |current| FileAttributes {
                uid: current.uid,
                gid: Some(gid),
                ..FileAttributes::empty()
            })
            .await;
        settle(&self.pool, lease, result)
            .await
            .map_err(|e| translate::set_group(&path, e))
    }

    async fn set_permissions(&self, path: &str, mode: u32) -> Result<()> {
        let path = self.resolve(path);
        let lease = self.pool.acquire().await?;
        let attrs = FileAttributes {
            permissions: Some(mode & 0o7777),
            ..FileAttributes::empty()
        };
        let result = lease.sftp.set_metadata(path.as_str(), attrs).await.map_err(OpError::from);
        settle(&self.pool, lease, result)
            .await
            .map_err(|e| translate::set_permissions(&path, e))
    }

    async fn set_mtime(&self, path: &str, mtime: SystemTime) -> Result<()> {
        let path = self.resolve(path);
        let mtime = epoch_secs(mtime);
        let lease = self.pool.acquire().await?;
        let result = lease
            .update_attributes(&path, |current| FileAttributes {
                atime: current.atime.or(Some(mtime)),
                mtime: Some(mtime),
                ..FileAttributes::empty()
            })
            .await;
        settle(&self.pool, lease, result)
            .await
            .map_err(|e| translate::set_mtime(&path, e))
    }

    async fn close(&self) -> Result<()> {
        info!("Closing SFTP pool for {}:{}", self.config.host, self.config.port);
        self.pool.close().await?;
        Ok(())
    }
}

/// Provider registered under the `sftp` scheme
pub struct SftpProvider;

#[async_trait]
impl FileSystemProvider for SftpProvider {
    async fn open(&self, config: FileSystemConfiguration) -> Result<Arc<dyn FileSystem>> {
        Ok(Arc::new(SftpFileSystem::new(config).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use russh_sftp::protocol::{Status, StatusCode as Sftp};

    fn status(code: Sftp) -> OpError {
        OpError::Sftp(SftpError::Status(Status {
            id: 1,
            status_code: code,
            error_message: "nope".to_string(),
            language_tag: "en".to_string(),
        }))
    }

    #[test]
    fn test_status_errors_keep_channel() {
        let (err, reusable) = status(Sftp::NoSuchFile).classify();
        assert_eq!(err.code, StatusCode::NoSuchFile);
        assert_eq!(err.message, "nope");
        assert!(reusable);

        let (_, reusable) = status(Sftp::PermissionDenied).classify();
        assert!(reusable);
    }

    #[test]
    fn test_transport_errors_discard_channel() {
        let (err, reusable) = status(Sftp::ConnectionLost).classify();
        assert_eq!(err.code, StatusCode::ConnectionLost);
        assert!(!reusable);

        let (err, reusable) = OpError::Sftp(SftpError::UnexpectedBehavior("eof".to_string())).classify();
        assert_eq!(err.code, StatusCode::ConnectionLost);
        assert!(!reusable);

        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "pipe");
        let (err, reusable) = OpError::Io(io_err).classify();
        assert_eq!(err.code, StatusCode::Failure);
        assert!(!reusable);
    }

    #[test]
    fn test_host_key_policy() {
        assert!(accept_host_key(None, KnownHost::NotConfigured));
        assert!(!accept_host_key(Some(true), KnownHost::NotConfigured));
        assert!(accept_host_key(Some(true), KnownHost::Match));
        assert!(!accept_host_key(None, KnownHost::Unknown));
        assert!(accept_host_key(Some(false), KnownHost::Unknown));
        assert!(!accept_host_key(Some(false), KnownHost::Mismatch));
    }

    #[test]
    fn test_ssh_options() {
        let options: BTreeMap<String, String> = [
            ("StrictHostKeyChecking", "no"),
            ("ServerAliveInterval", "15"),
            ("ServerAliveCountMax", "5"),
            ("Compression", "yes"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let parsed = SshOptions::from_options(&options);
        assert_eq!(parsed.strict_host_key_checking, Some(false));
        assert_eq!(parsed.keepalive_interval, Some(Duration::from_secs(15)));
        assert_eq!(parsed.keepalive_max, Some(5));

        let config = parsed.client_config(Some(Duration::from_secs(30)));
        assert_eq!(config.inactivity_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.keepalive_max, 5);

        assert_eq!(SshOptions::from_options(&BTreeMap::new()), SshOptions::default());
    }

    #[test]
    fn test_absolute() {
        assert_eq!(absolute(None, "rel/file"), "rel/file");
        assert_eq!(absolute(Some("/home/me"), "/etc/hosts"), "/etc/hosts");
        assert_eq!(absolute(Some("/home/me/"), "rel/file"), "/home/me/rel/file");
        assert_eq!(absolute(Some("/home/me"), "."), "/home/me/");
    }

    #[test]
    fn test_to_metadata() {
        let attrs = FileAttributes {
            size: Some(42),
            uid: Some(1000),
            gid: Some(100),
            permissions: Some(0o100640),
            mtime: Some(1_700_000_000),
            ..FileAttributes::empty()
        };
        let meta = to_metadata(&attrs);
        assert!(meta.is_file());
        assert_eq!(meta.size, 42);
        assert_eq!(meta.mode, Some(0o640));
        assert_eq!(meta.uid, Some(1000));

        let dir = to_metadata(&FileAttributes {
            permissions: Some(0o040755),
            ..FileAttributes::empty()
        });
        assert!(dir.is_dir());
    }
}
