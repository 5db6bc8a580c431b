pub mod proxy;
pub mod s3;
pub mod sftp;

#[cfg(test)]
pub(crate) mod testing;

use std::pin::Pin;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::error::{Result, VfsError};
use crate::registry::FileSystemConfiguration;

/// File type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
    Symlink,
}

/// POSIX file type bits
const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;
const S_IFLNK: u32 = 0o120000;

/// Metadata for a file, directory or link
#[derive(Debug, Clone)]
pub struct Metadata {
    pub file_type: FileType,
    pub size: u64,
    pub mtime: SystemTime,
    /// POSIX permission bits (e.g., 0o644), when the backend reports them
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

impl Metadata {
    pub fn file(size: u64, mtime: SystemTime) -> Self {
        Self {
            file_type: FileType::File,
            size,
            mtime,
            mode: None,
            uid: None,
            gid: None,
        }
    }

    pub fn directory(mtime: SystemTime) -> Self {
        Self {
            file_type: FileType::Directory,
            size: 0,
            mtime,
            mode: None,
            uid: None,
            gid: None,
        }
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode & 0o7777);
        self
    }

    /// File type from the `S_IFMT` bits of a full mode word
    pub fn file_type_from_mode(mode: u32) -> FileType {
        match mode & S_IFMT {
            S_IFDIR => FileType::Directory,
            S_IFLNK => FileType::Symlink,
            _ => FileType::File,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self.file_type, FileType::File)
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.file_type, FileType::Directory)
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self.file_type, FileType::Symlink)
    }
}

/// Directory entry returned by list_dir
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub file_type: FileType,
}

impl DirEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_type: FileType::File,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_type: FileType::Directory,
        }
    }
}

/// Stream type for directory listings
pub type DirEntryStream = Pin<Box<dyn Stream<Item = Result<DirEntry>> + Send>>;

/// A mounted backend filesystem
///
/// Paths are absolute, `/`-separated strings within the mount. Backends
/// report failures through [`crate::translate`] so every implementation
/// produces the same error kinds.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Scheme this filesystem was mounted under
    fn scheme(&self) -> &str;

    /// Configuration the mount was built from
    fn configuration(&self) -> &FileSystemConfiguration;

    /// Get metadata for a path
    async fn stat(&self, path: &str) -> Result<Metadata>;

    /// Check if a path exists
    ///
    /// Default implementation uses stat()
    async fn exists(&self, path: &str) -> Result<bool> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(VfsError::NoSuchFile { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// List directory contents as a stream
    fn list_dir(&self, path: &str) -> DirEntryStream;

    /// Resolve a symbolic link to its target
    async fn read_link(&self, path: &str) -> Result<String>;

    /// Check that `path` is a directory and return its canonical form
    async fn change_dir(&self, path: &str) -> Result<String>;

    /// Create a directory
    async fn create_dir(&self, path: &str) -> Result<()>;

    /// Remove a file, or an empty directory when `is_dir` is set
    async fn remove(&self, path: &str, is_dir: bool) -> Result<()>;

    /// Read a whole file
    async fn read(&self, path: &str) -> Result<Bytes>;

    /// Create or replace a file with `data`
    async fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Copy a file within the mount
    async fn copy(&self, from: &str, to: &str) -> Result<()>;

    /// Rename/move a file or directory
    async fn rename(&self, from: &str, to: &str) -> Result<()>;

    async fn set_owner(&self, path: &str, uid: u32) -> Result<()>;

    async fn set_group(&self, path: &str, gid: u32) -> Result<()>;

    async fn set_permissions(&self, path: &str, mode: u32) -> Result<()>;

    async fn set_mtime(&self, path: &str, mtime: SystemTime) -> Result<()>;

    /// Release every backend resource held by this mount
    async fn close(&self) -> Result<()>;
}

/// Builds a backend filesystem for one scheme
#[async_trait]
pub trait FileSystemProvider: Send + Sync {
    async fn open(&self, config: FileSystemConfiguration) -> Result<Arc<dyn FileSystem>>;
}

/// Seconds since the epoch, clamped to the 32-bit range SFTP v3 carries
pub(crate) fn epoch_secs(time: SystemTime) -> u32 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs().min(u32::MAX as u64) as u32)
        .unwrap_or(0)
}
