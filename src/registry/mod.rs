//! Mount registry and URI routing

pub mod builder;
pub mod resolve;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::Config;
use crate::connector::s3::S3Provider;
use crate::connector::sftp::SftpProvider;
use crate::connector::FileSystemProvider;
use crate::error::{Result, VfsError};
use crate::mount::{MountEntry, MountKey};
use crate::path::ResolvedPath;

pub use builder::{Builder, FileSystemConfiguration, Identity};
use resolve::{decoded_path, normalize_scheme, strip_bucket, RequestTarget};

struct MountTable {
    /// Registration order; `resolve` takes the first match
    entries: Vec<Arc<MountEntry>>,
    closed: bool,
}

/// Owns every mounted filesystem and routes URIs to them
pub struct FileSystemRegistry {
    providers: RwLock<HashMap<String, Arc<dyn FileSystemProvider>>>,
    mounts: RwLock<MountTable>,
}

impl Default for FileSystemRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystemRegistry {
    /// Registry with the built-in `sftp` and `s3` providers
    pub fn new() -> Self {
        let registry = Self::empty();
        registry.register_provider("sftp", SftpProvider);
        registry.register_provider("s3", S3Provider);
        registry
    }

    /// Registry with no providers
    pub fn empty() -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
            mounts: RwLock::new(MountTable {
                entries: Vec::new(),
                closed: false,
            }),
        }
    }

    /// Register (or replace) the provider used to build mounts for `scheme`
    pub fn register_provider<P>(&self, scheme: &str, provider: P)
    where
        P: FileSystemProvider + 'static,
    {
        self.providers
            .write()
            .insert(normalize_scheme(scheme), Arc::new(provider));
    }

    /// Start configuring a new mount
    pub fn builder(&self, scheme: impl Into<String>) -> Builder<'_> {
        Builder::new(self, scheme)
    }

    pub(crate) async fn mount(&self, config: FileSystemConfiguration) -> Result<Arc<MountEntry>> {
        config.pool.validate().map_err(VfsError::Config)?;

        let key = MountKey::from_configuration(&config);
        let uri = key.to_string();
        self.check_vacant(&key)?;

        let provider = self
            .providers
            .read()
            .get(&key.scheme)
            .cloned()
            .ok_or_else(|| VfsError::UnsupportedScheme(key.scheme.clone()))?;

        info!("Mounting {}", uri);
        let filesystem = provider.open(config).await?;
        let entry = Arc::new(MountEntry::new(key, filesystem));

        // Publish only a fully constructed mount
        let conflict = {
            let mut table = self.mounts.write();
            if table.closed {
                Some(VfsError::RegistryClosed)
            } else if table.entries.iter().any(|e| e.key() == entry.key()) {
                Some(VfsError::AlreadyMounted(uri.clone()))
            } else {
                table.entries.push(entry.clone());
                None
            }
        };

        if let Some(err) = conflict {
            if let Err(e) = entry.filesystem().close().await {
                warn!("Failed to close superseded mount {}: {}", uri, e);
            }
            return Err(err);
        }

        info!("Successfully mounted {}", uri);
        Ok(entry)
    }

    fn check_vacant(&self, key: &MountKey) -> Result<()> {
        let table = self.mounts.read();
        if table.closed {
            return Err(VfsError::RegistryClosed);
        }
        if table.entries.iter().any(|e| e.key() == key) {
            return Err(VfsError::AlreadyMounted(key.to_string()));
        }
        Ok(())
    }

    /// Mount every entry of a loaded configuration, stopping at the first failure
    pub async fn mount_all(&self, config: &Config) -> Result<usize> {
        for mount in &config.mounts {
            mount.builder(self).build().await?;
        }
        Ok(config.mounts.len())
    }

    /// Route a URI to the mount that serves it
    pub fn resolve(&self, uri: &str) -> Result<ResolvedPath> {
        let url = Url::parse(uri).map_err(|source| VfsError::InvalidUri {
            uri: uri.to_string(),
            source,
        })?;
        self.route(&url, uri)
    }

    pub fn resolve_url(&self, url: &Url) -> Result<ResolvedPath> {
        self.route(url, url.as_str())
    }

    fn route(&self, url: &Url, raw: &str) -> Result<ResolvedPath> {
        let target = RequestTarget::from_url(url, raw);

        let entry = {
            let table = self.mounts.read();
            table
                .entries
                .iter()
                .find(|entry| entry.key().matches(&target))
                .cloned()
        };

        let entry = entry.ok_or_else(|| VfsError::UnresolvedMount(raw.to_string()))?;
        let path = strip_bucket(&decoded_path(url), entry.key().bucket.as_deref());
        debug!("Resolved {} to {} on {}", raw, path, entry.uri());
        ResolvedPath::new(entry, &path)
    }

    /// Mount registered under exactly this mount URI
    pub fn get(&self, uri: &str) -> Option<Arc<MountEntry>> {
        self.mounts
            .read()
            .entries
            .iter()
            .find(|entry| entry.uri() == uri)
            .cloned()
    }

    pub fn mounts(&self) -> Vec<Arc<MountEntry>> {
        self.mounts.read().entries.clone()
    }

    /// Number of active mounts
    pub fn count(&self) -> usize {
        self.mounts.read().entries.len()
    }

    pub fn is_closed(&self) -> bool {
        self.mounts.read().closed
    }

    /// Close every mounted filesystem
    ///
    /// Every mount is attempted even after a failure; the first failure is
    /// returned and the rest are logged. The registry accepts no new mounts
    /// afterwards.
    pub async fn close(&self) -> Result<()> {
        let entries = {
            let mut table = self.mounts.write();
            table.closed = true;
            std::mem::take(&mut table.entries)
        };

        info!("Closing {} mount(s)", entries.len());

        let mut first_error = None;
        for entry in entries {
            match entry.filesystem().close().await {
                Ok(()) => debug!("Closed {}", entry.uri()),
                Err(e) => {
                    error!("Failed to close {}: {}", entry.uri(), e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for FileSystemRegistry {
    fn drop(&mut self) {
        let table = self.mounts.get_mut();
        if !table.closed && !table.entries.is_empty() {
            warn!(
                "Filesystem registry dropped with {} open mount(s); call close() first",
                table.entries.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::testing::MockProvider;
    use crate::pool::PoolConfig;

    fn registry_with(provider: &MockProvider) -> FileSystemRegistry {
        let registry = FileSystemRegistry::empty();
        registry.register_provider("sftp", provider.clone());
        registry.register_provider("s3", provider.clone());
        registry
    }

    async fn mount_fixtures(registry: &FileSystemRegistry) {
        registry
            .builder("sftp")
            .host("host")
            .port(22)
            .username("user")
            .bucket("bucketA")
            .build()
            .await
            .unwrap();
        registry
            .builder("s3")
            .host("minio")
            .port(9000)
            .bucket("logs")
            .build()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_resolve_by_user_info_strips_bucket() {
        let provider = MockProvider::default();
        let registry = registry_with(&provider);
        mount_fixtures(&registry).await;

        let resolved = registry
            .resolve("sftp://user@host/bucketA/dir/file.txt")
            .unwrap();
        assert_eq!(resolved.path(), "/dir/file.txt");
        assert_eq!(resolved.uri().as_str(), "sftp://user@host:22/dir/file.txt");
        assert_eq!(resolved.mount().uri(), "sftp://user@host:22/bucketA");

        registry.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_resolve_hands_decoded_paths_to_backend() {
        let provider = MockProvider::default();
        let registry = registry_with(&provider);
        mount_fixtures(&registry).await;
        registry
            .builder("sftp")
            .host("vault")
            .port(22)
            .username("archivist")
            .bucket("My Data")
            .build()
            .await
            .unwrap();

        let spaced = registry.resolve("sftp://user@host/bucketA/my%20file.txt").unwrap();
        assert_eq!(spaced.path(), "/my file.txt");
        assert_eq!(spaced.uri().as_str(), "sftp://user@host:22/my%20file.txt");
        spaced.write(b"x").await.unwrap();

        let accented = registry.resolve("sftp://user@host/bucketA/caf%C3%A9.txt").unwrap();
        assert_eq!(accented.path(), "/café.txt");
        accented.write(b"y").await.unwrap();

        let unencoded = registry.resolve("sftp://user@host/bucketA/café.txt").unwrap();
        assert_eq!(unencoded.path(), "/café.txt");
        assert_eq!(unencoded.read().await.unwrap().as_ref(), b"y");

        let backend = provider.opened.lock()[0].clone();
        assert_eq!(backend.paths(), vec!["/café.txt".to_string(), "/my file.txt".to_string()]);

        let in_bucket = registry.resolve("sftp://guest@vault/my%20data/x.txt").unwrap();
        assert_eq!(in_bucket.mount().uri(), "sftp://archivist@vault:22/My Data");
        assert_eq!(in_bucket.path(), "/x.txt");

        registry.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_resolve_drops_query_and_fragment() {
        let provider = MockProvider::default();
        let registry = registry_with(&provider);
        mount_fixtures(&registry).await;

        let resolved = registry
            .resolve("sftp://user@host/bucketA/dir/f.txt?version=2#top")
            .unwrap();
        assert_eq!(resolved.path(), "/dir/f.txt");
        assert_eq!(resolved.uri().query(), None);
        assert_eq!(resolved.uri().fragment(), None);

        registry.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_resolve_strips_every_bucket_segment() {
        let provider = MockProvider::default();
        let registry = registry_with(&provider);
        mount_fixtures(&registry).await;

        let resolved = registry.resolve("sftp://user@host/bucketA/x/bucketA/f").unwrap();
        assert_eq!(resolved.path(), "/x/f");

        registry.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_user_info_match_keeps_foreign_first_segment() {
        let provider = MockProvider::default();
        let registry = registry_with(&provider);
        mount_fixtures(&registry).await;

        let resolved = registry.resolve("sftp://user@host/other/dir/f").unwrap();
        assert_eq!(resolved.mount().uri(), "sftp://user@host:22/bucketA");
        assert_eq!(resolved.path(), "/other/dir/f");

        registry.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_join_keeps_reserved_characters_in_the_segment() {
        let provider = MockProvider::default();
        let registry = registry_with(&provider);
        mount_fixtures(&registry).await;

        let dir = registry.resolve("s3://logs/2024").unwrap();
        let child = dir.join("a#b?c").unwrap();
        assert_eq!(child.path(), "/2024/a#b?c");
        assert_eq!(child.uri().path(), "/2024/a%23b%3Fc");
        assert_eq!(child.uri().query(), None);
        assert_eq!(child.uri().fragment(), None);

        child.write(b"z").await.unwrap();
        let backend = provider.opened.lock()[1].clone();
        assert_eq!(backend.paths(), vec!["/2024/a#b?c".to_string()]);

        registry.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_resolve_s3a_alias_by_bucket() {
        let provider = MockProvider::default();
        let registry = registry_with(&provider);
        mount_fixtures(&registry).await;

        let resolved = registry.resolve("s3a://logs/2024/01/a.log").unwrap();
        assert_eq!(resolved.path(), "/2024/01/a.log");
        assert_eq!(resolved.filesystem().scheme(), "s3");
        assert_eq!(resolved.mount().key().host, "minio");

        let upper = registry.resolve("s3://LOGS/2024/01/a.log").unwrap();
        assert_eq!(upper.mount().uri(), resolved.mount().uri());

        registry.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_unresolved_uri_is_named_in_error() {
        let provider = MockProvider::default();
        let registry = registry_with(&provider);
        mount_fixtures(&registry).await;

        let err = registry.resolve("sftp://nobody@elsewhere/x").unwrap_err();
        assert!(matches!(err, VfsError::UnresolvedMount(_)));
        assert!(err.to_string().contains("sftp://nobody@elsewhere/x"));

        assert!(matches!(
            registry.resolve("ftp://user@host/bucketA/f"),
            Err(VfsError::UnresolvedMount(_))
        ));
        assert!(matches!(
            registry.resolve("not a uri"),
            Err(VfsError::InvalidUri { .. })
        ));

        registry.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent() {
        let provider = MockProvider::default();
        let registry = registry_with(&provider);
        mount_fixtures(&registry).await;

        let first = registry.resolve("sftp://user@host/bucketA/a/b").unwrap();
        let second = registry.resolve("sftp://user@host/bucketA/a/b").unwrap();
        assert_eq!(first.uri(), second.uri());
        assert!(Arc::ptr_eq(first.mount(), second.mount()));

        let again = registry.resolve_url(first.uri()).unwrap();
        assert_eq!(again.path(), "/a/b");
        assert!(Arc::ptr_eq(first.mount(), again.mount()));

        registry.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_first_registered_mount_wins() {
        let provider = MockProvider::default();
        let registry = registry_with(&provider);
        registry
            .builder("sftp")
            .host("one")
            .username("shared")
            .build()
            .await
            .unwrap();
        registry
            .builder("sftp")
            .host("two")
            .username("shared")
            .build()
            .await
            .unwrap();

        let resolved = registry.resolve("sftp://shared@anything/f").unwrap();
        assert_eq!(resolved.mount().key().host, "one");

        registry.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_and_unsupported_mounts_rejected() {
        let provider = MockProvider::default();
        let registry = registry_with(&provider);
        mount_fixtures(&registry).await;

        let err = registry
            .builder("sftp")
            .host("host")
            .port(22)
            .username("user")
            .bucket("bucketA")
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::AlreadyMounted(_)));
        assert_eq!(provider.opened.lock().len(), 2);

        let err = registry.builder("ftp").build().await.unwrap_err();
        assert!(matches!(err, VfsError::UnsupportedScheme(ref s) if s == "ftp"));

        let err = registry
            .builder("sftp")
            .host("other")
            .pool_config(PoolConfig::new(4, 2))
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::Config(_)));

        assert_eq!(registry.count(), 2);
        registry.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_closes_each_mount_once_and_reports_first_failure() {
        let provider = MockProvider::failing_close(&["host"]);
        let registry = registry_with(&provider);
        mount_fixtures(&registry).await;
        assert!(registry.get("s3://minio:9000/logs").is_some());

        let err = registry.close().await.unwrap_err();
        assert!(err.to_string().contains("host"));

        // Retrying close must not touch the already-closed mounts
        registry.close().await.unwrap();

        let opened = provider.opened.lock();
        assert_eq!(opened.len(), 2);
        assert!(opened.iter().all(|fs| fs.close_count() == 1));
        drop(opened);

        assert!(registry.is_closed());
        assert_eq!(registry.count(), 0);
        assert!(matches!(
            registry.resolve("s3://logs/a"),
            Err(VfsError::UnresolvedMount(_))
        ));
        assert!(matches!(
            registry.builder("s3").bucket("x").build().await,
            Err(VfsError::RegistryClosed)
        ));
    }

    #[tokio::test]
    async fn test_resolved_path_delegates_to_filesystem() {
        let provider = MockProvider::default();
        let registry = registry_with(&provider);
        mount_fixtures(&registry).await;

        let dir = registry.resolve("s3://logs/2024").unwrap();
        let file = dir.join("a.log").unwrap();
        assert_eq!(file.path(), "/2024/a.log");

        assert!(!file.exists().await.unwrap());
        file.write(b"hello").await.unwrap();
        assert_eq!(file.read().await.unwrap().as_ref(), b"hello");
        assert_eq!(file.stat().await.unwrap().size, 5);

        let names: Vec<String> = dir.list().await.unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["a.log".to_string()]);

        file.remove(false).await.unwrap();
        let err = file.stat().await.unwrap_err();
        assert!(matches!(err, VfsError::NoSuchFile { .. }));

        registry.close().await.unwrap();
    }
}
