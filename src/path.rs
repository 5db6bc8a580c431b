//! Paths bound to the mount that serves them

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures::TryStreamExt;
use url::{ParseError, Url};

use crate::connector::{DirEntry, FileSystem, Metadata};
use crate::error::{Result, VfsError};
use crate::mount::MountEntry;

/// Result of [`FileSystemRegistry::resolve`](crate::registry::FileSystemRegistry::resolve)
#[derive(Clone)]
pub struct ResolvedPath {
    uri: Url,
    path: String,
    entry: Arc<MountEntry>,
}

impl ResolvedPath {
    /// `path` is the decoded in-mount path; the URI re-encodes each segment
    pub(crate) fn new(entry: Arc<MountEntry>, path: &str) -> Result<Self> {
        let origin = entry.key().origin();
        let mut uri = Url::parse(&origin).map_err(|source| VfsError::InvalidUri {
            uri: origin.clone(),
            source,
        })?;
        uri.path_segments_mut()
            .map_err(|()| VfsError::InvalidUri {
                uri: origin,
                source: ParseError::RelativeUrlWithCannotBeABaseBase,
            })?
            .clear()
            .extend(path.trim_start_matches('/').split('/'));

        let path = match path {
            "" => "/".to_string(),
            path if path.starts_with('/') => path.to_string(),
            path => format!("/{}", path),
        };
        Ok(Self { uri, path, entry })
    }

    /// Canonical URI: mount origin plus the in-mount path
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    /// Absolute, decoded path within the mount
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn filesystem(&self) -> &Arc<dyn FileSystem> {
        self.entry.filesystem()
    }

    pub fn mount(&self) -> &Arc<MountEntry> {
        &self.entry
    }

    /// Child path on the same mount
    pub fn join(&self, segment: &str) -> Result<Self> {
        let segment = segment.trim_matches('/');
        let path = match (self.path().trim_end_matches('/'), segment) {
            (base, "") => format!("{}/", base),
            (base, child) => format!("{}/{}", base, child),
        };
        Self::new(self.entry.clone(), &path)
    }

    pub async fn stat(&self) -> Result<Metadata> {
        self.filesystem().stat(self.path()).await
    }

    pub async fn exists(&self) -> Result<bool> {
        self.filesystem().exists(self.path()).await
    }

    /// Collect a directory listing
    pub async fn list(&self) -> Result<Vec<DirEntry>> {
        self.filesystem().list_dir(self.path()).try_collect().await
    }

    pub async fn read(&self) -> Result<Bytes> {
        self.filesystem().read(self.path()).await
    }

    pub async fn write(&self, data: &[u8]) -> Result<()> {
        self.filesystem().write(self.path(), data).await
    }

    pub async fn remove(&self, is_dir: bool) -> Result<()> {
        self.filesystem().remove(self.path(), is_dir).await
    }
}

impl fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uri)
    }
}

impl fmt::Debug for ResolvedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedPath")
            .field("uri", &self.uri.as_str())
            .field("mount", &self.entry.uri())
            .finish()
    }
}
