//! Mount keys and registered mounts

use std::fmt;
use std::sync::Arc;

use crate::connector::FileSystem;
use crate::registry::resolve::{normalize_scheme, same, RequestTarget};
use crate::registry::FileSystemConfiguration;

/// Identity of a mount: `scheme://[user@]host:port[/bucket]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MountKey {
    pub scheme: String,
    pub user_info: Option<String>,
    pub host: String,
    pub port: u16,
    pub bucket: Option<String>,
}

impl MountKey {
    pub fn from_configuration(config: &FileSystemConfiguration) -> Self {
        Self {
            scheme: normalize_scheme(&config.scheme),
            user_info: config.username.clone().filter(|u| !u.is_empty()),
            host: config.host.clone(),
            port: config.port,
            bucket: config.bucket.clone().filter(|b| !b.is_empty()),
        }
    }

    /// Scheme must agree; then either the bucket or the user-info must
    pub fn matches(&self, target: &RequestTarget) -> bool {
        self.scheme.eq_ignore_ascii_case(&target.scheme)
            && (same(self.bucket.as_deref(), target.bucket.as_deref())
                || same(self.user_info.as_deref(), target.user_info.as_deref()))
    }

    /// `scheme://[user@]host:port` prefix used to build paths inside the mount
    pub fn origin(&self) -> String {
        match &self.user_info {
            Some(user) => format!("{}://{}@{}:{}", self.scheme, user, self.host, self.port),
            None => format!("{}://{}:{}", self.scheme, self.host, self.port),
        }
    }
}

impl fmt::Display for MountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.origin())?;
        if let Some(bucket) = &self.bucket {
            write!(f, "/{}", bucket)?;
        }
        Ok(())
    }
}

/// A registered, connected backend
pub struct MountEntry {
    key: MountKey,
    filesystem: Arc<dyn FileSystem>,
}

impl MountEntry {
    pub(crate) fn new(key: MountKey, filesystem: Arc<dyn FileSystem>) -> Self {
        Self { key, filesystem }
    }

    pub fn key(&self) -> &MountKey {
        &self.key
    }

    pub fn filesystem(&self) -> &Arc<dyn FileSystem> {
        &self.filesystem
    }

    pub fn uri(&self) -> String {
        self.key.to_string()
    }
}

impl fmt::Debug for MountEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountEntry")
            .field("key", &self.key.to_string())
            .field("scheme", &self.filesystem.scheme())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(user: Option<&str>, bucket: Option<&str>) -> MountKey {
        MountKey {
            scheme: "sftp".to_string(),
            user_info: user.map(str::to_string),
            host: "host".to_string(),
            port: 22,
            bucket: bucket.map(str::to_string),
        }
    }

    fn target(scheme: &str, user: Option<&str>, bucket: Option<&str>) -> RequestTarget {
        RequestTarget {
            scheme: scheme.to_string(),
            bucket: bucket.map(str::to_string),
            user_info: user.map(str::to_string),
        }
    }

    #[test]
    fn test_display_formats() {
        assert_eq!(key(Some("user"), Some("bucketA")).to_string(), "sftp://user@host:22/bucketA");
        assert_eq!(key(None, None).to_string(), "sftp://host:22");
    }

    #[test]
    fn test_matches_on_bucket_or_user_info() {
        let mount = key(Some("user"), Some("Data"));
        assert!(mount.matches(&target("sftp", None, Some("data"))));
        assert!(mount.matches(&target("sftp", Some("USER"), Some("other"))));
        assert!(!mount.matches(&target("sftp", Some("bob"), Some("other"))));
        assert!(!mount.matches(&target("s3", Some("user"), Some("data"))));
    }

    #[test]
    fn test_missing_fields_never_match_each_other() {
        let mount = key(None, None);
        assert!(!mount.matches(&target("sftp", None, None)));
    }
}
