//! In-memory filesystem used by unit tests

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use super::{DirEntry, DirEntryStream, FileSystem, FileSystemProvider, Metadata};
use crate::error::Result;
use crate::registry::FileSystemConfiguration;
use crate::translate::{self, StatusCode, StatusError};

pub struct MockFileSystem {
    config: FileSystemConfiguration,
    files: Mutex<BTreeMap<String, Bytes>>,
    pub closes: AtomicUsize,
    fail_close: bool,
}

impl MockFileSystem {
    pub fn new(config: FileSystemConfiguration, fail_close: bool) -> Self {
        Self {
            config,
            files: Mutex::new(BTreeMap::new()),
            closes: AtomicUsize::new(0),
            fail_close,
        }
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Paths currently stored, exactly as the filesystem received them
    pub fn paths(&self) -> Vec<String> {
        self.files.lock().keys().cloned().collect()
    }

    fn missing(path: &str) -> StatusError {
        StatusError::new(StatusCode::NoSuchFile, format!("{} not found", path))
    }
}

#[async_trait]
impl FileSystem for MockFileSystem {
    fn scheme(&self) -> &str {
        &self.config.scheme
    }

    fn configuration(&self) -> &FileSystemConfiguration {
        &self.config
    }

    async fn stat(&self, path: &str) -> Result<Metadata> {
        let files = self.files.lock();
        match files.get(path) {
            Some(data) => Ok(Metadata::file(data.len() as u64, SystemTime::UNIX_EPOCH)),
            None => Err(translate::stat(path, Self::missing(path))),
        }
    }

    fn list_dir(&self, path: &str) -> DirEntryStream {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let entries: Vec<Result<DirEntry>> = self
            .files
            .lock()
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(|name| Ok(DirEntry::file(name)))
            .collect();
        Box::pin(futures::stream::iter(entries))
    }

    async fn read_link(&self, path: &str) -> Result<String> {
        Err(translate::read_link(
            path,
            StatusError::new(StatusCode::Failure, "not a link"),
        ))
    }

    async fn change_dir(&self, path: &str) -> Result<String> {
        Ok(path.to_string())
    }

    async fn create_dir(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    async fn remove(&self, path: &str, is_dir: bool) -> Result<()> {
        match self.files.lock().remove(path) {
            Some(_) => Ok(()),
            None => Err(translate::delete(path, is_dir, Self::missing(path))),
        }
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        let files = self.files.lock();
        files
            .get(path)
            .cloned()
            .ok_or_else(|| translate::read(path, Self::missing(path)))
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        self.files
            .lock()
            .insert(path.to_string(), Bytes::copy_from_slice(data));
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        let mut files = self.files.lock();
        let data = files
            .get(from)
            .cloned()
            .ok_or_else(|| translate::copy(from, to, Self::missing(from)))?;
        files.insert(to.to_string(), data);
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut files = self.files.lock();
        let data = files
            .remove(from)
            .ok_or_else(|| translate::rename(from, to, Self::missing(from)))?;
        files.insert(to.to_string(), data);
        Ok(())
    }

    async fn set_owner(&self, _path: &str, _uid: u32) -> Result<()> {
        Ok(())
    }

    async fn set_group(&self, _path: &str, _gid: u32) -> Result<()> {
        Ok(())
    }

    async fn set_permissions(&self, _path: &str, _mode: u32) -> Result<()> {
        Ok(())
    }

    async fn set_mtime(&self, _path: &str, _mtime: SystemTime) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(translate::map(
                "close",
                StatusError::new(StatusCode::ConnectionLost, "already gone"),
                &self.config.host,
                None,
            ));
        }
        Ok(())
    }
}

/// Records every filesystem it opens; hosts listed in `failing` refuse to close
#[derive(Default, Clone)]
pub struct MockProvider {
    pub opened: Arc<Mutex<Vec<Arc<MockFileSystem>>>>,
    pub failing: Vec<String>,
}

impl MockProvider {
    pub fn failing_close(hosts: &[&str]) -> Self {
        Self {
            opened: Arc::default(),
            failing: hosts.iter().map(|h| h.to_string()).collect(),
        }
    }
}

#[async_trait]
impl FileSystemProvider for MockProvider {
    async fn open(&self, config: FileSystemConfiguration) -> Result<Arc<dyn FileSystem>> {
        let fail_close = self.failing.contains(&config.host);
        let filesystem = Arc::new(MockFileSystem::new(config, fail_close));
        self.opened.lock().push(filesystem.clone());
        Ok(filesystem)
    }
}
