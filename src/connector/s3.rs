//! S3 connector implementation
//!
//! This connector provides access to Amazon S3 or S3-compatible storage
//! backends (MinIO, LocalStack, etc.). Service errors are reduced to a
//! [`StatusCode`] and reported through the same translator as SFTP.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

/// S3 metadata key for storing POSIX file mode
const S3_MODE_METADATA_KEY: &str = "posix-mode";

/// Sub-option naming the signing region
const OPT_REGION: &str = "region";
const DEFAULT_REGION: &str = "us-east-1";

use async_stream::try_stream;
use async_trait::async_trait;
use aws_config::timeout::TimeoutConfig;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::MetadataDirective;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::{debug, info, trace};

use crate::connector::{
    DirEntry, DirEntryStream, FileSystem, FileSystemProvider, Metadata,
};
use crate::error::{Result, VfsError};
use crate::registry::FileSystemConfiguration;
use crate::translate::{self, StatusCode, StatusError};

/// Status code for an S3 error code and HTTP status
pub fn classify(code: Option<&str>, http_status: Option<u16>) -> StatusCode {
    match (code, http_status) {
        (Some("NoSuchKey" | "NoSuchBucket" | "NotFound"), _) | (_, Some(404)) => {
            StatusCode::NoSuchFile
        }
        (
            Some("AccessDenied" | "Forbidden" | "InvalidAccessKeyId" | "SignatureDoesNotMatch"),
            _,
        )
        | (_, Some(401 | 403)) => StatusCode::PermissionDenied,
        _ => StatusCode::Failure,
    }
}

fn s3_status<E>(err: &SdkError<E, HttpResponse>) -> StatusError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let code = match err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => StatusCode::NoConnection,
        SdkError::ResponseError(_) => StatusCode::ConnectionLost,
        _ => classify(err.code(), err.raw_response().map(|r| r.status().as_u16())),
    };
    let message = match err.message() {
        Some(message) => message.to_string(),
        None => DisplayErrorContext(err).to_string(),
    };
    StatusError::new(code, message)
}

fn status(code: StatusCode, message: impl Into<String>) -> StatusError {
    StatusError::new(code, message)
}

/// S3-backed filesystem over a single bucket
pub struct S3FileSystem {
    config: FileSystemConfiguration,
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3FileSystem {
    /// Create a new S3 filesystem from mount configuration
    pub async fn new(config: FileSystemConfiguration) -> Result<Self> {
        let bucket = config
            .bucket
            .clone()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| VfsError::Config(format!("s3 mount on {} has no bucket", config.host)))?;

        let region = config.option(OPT_REGION).unwrap_or(DEFAULT_REGION).to_string();
        let mut sdk_config_builder =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region));

        if let (Some(access_key), Some(secret_key)) = (&config.username, &config.password) {
            sdk_config_builder = sdk_config_builder.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "remote-vfs",
            ));
        }

        let mut timeouts = TimeoutConfig::builder();
        if let Some(limit) = config.connect_timeout {
            timeouts = timeouts.connect_timeout(limit);
        }
        if let Some(limit) = config.timeout {
            timeouts = timeouts.operation_timeout(limit);
        }
        sdk_config_builder = sdk_config_builder.timeout_config(timeouts.build());

        let sdk_config = sdk_config_builder.load().await;

        let endpoint = format!("{}://{}:{}", config.protocol, config.host, config.port);
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .endpoint_url(&endpoint)
            .force_path_style(config.path_style_access)
            .build();

        let prefix = config
            .default_dir
            .as_deref()
            .map(|dir| dir.trim_matches('/').to_string())
            .unwrap_or_default();

        debug!("S3 mount for bucket {} at {}", bucket, endpoint);

        Ok(Self {
            client: Client::from_conf(s3_config),
            config,
            bucket,
            prefix,
        })
    }

    /// Convert a filesystem path to an S3 key
    fn path_to_key(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');

        if path.is_empty() {
            self.prefix.clone()
        } else if self.prefix.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.prefix, path)
        }
    }

    fn dir_key(&self, path: &str) -> String {
        let mut key = self.path_to_key(path);
        if !key.is_empty() && !key.ends_with('/') {
            key.push('/');
        }
        key
    }

    /// Create S3 metadata HashMap with mode
    fn mode_to_metadata(mode: u32) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        metadata.insert(S3_MODE_METADATA_KEY.to_string(), format!("{:o}", mode));
        metadata
    }

    /// True when any object lives under `dir_key`
    async fn has_children(&self, dir_key: &str, skip_marker: bool) -> std::result::Result<bool, StatusError> {
        let result = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(dir_key)
            .max_keys(2)
            .send()
            .await
            .map_err(|e| s3_status(&e))?;

        let children = result
            .contents()
            .iter()
            .filter(|obj| !(skip_marker && obj.key() == Some(dir_key)))
            .count();
        Ok(children > 0 || !result.common_prefixes().is_empty())
    }

    async fn copy_object(&self, from_key: &str, to_key: &str) -> std::result::Result<(), StatusError> {
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .key(to_key)
            .copy_source(format!("{}/{}", self.bucket, from_key))
            .send()
            .await
            .map_err(|e| s3_status(&e))?;
        Ok(())
    }

    /// Fails with NO_SUCH_FILE when `key` is not an object
    async fn head_key(&self, key: &str) -> std::result::Result<(), StatusError> {
        self.client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| s3_status(&e))?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> std::result::Result<(), StatusError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| s3_status(&e))?;
        Ok(())
    }
}

#[async_trait]
impl FileSystem for S3FileSystem {
    fn scheme(&self) -> &str {
        &self.config.scheme
    }

    fn configuration(&self) -> &FileSystemConfiguration {
        &self.config
    }

    async fn stat(&self, path: &str) -> Result<Metadata> {
        let key = self.path_to_key(path);
        trace!("stat: path={} key={}", path, key);

        // Root directory always exists
        if key.is_empty() || key == self.prefix {
            return Ok(Metadata::directory(SystemTime::now()));
        }

        // First try as a file (HeadObject)
        match self.client.head_object().bucket(&self.bucket).key(&key).send().await {
            Ok(output) => {
                let size = output.content_length().unwrap_or(0).max(0) as u64;
                let mtime = output
                    .last_modified()
                    .and_then(|dt| {
                        SystemTime::UNIX_EPOCH.checked_add(Duration::from_secs(dt.secs().max(0) as u64))
                    })
                    .unwrap_or(SystemTime::UNIX_EPOCH);

                let mode = output
                    .metadata()
                    .and_then(|m| m.get(S3_MODE_METADATA_KEY))
                    .and_then(|v| u32::from_str_radix(v, 8).ok());

                let meta = Metadata::file(size, mtime);
                return Ok(match mode {
                    Some(mode) => meta.with_mode(mode),
                    None => meta,
                });
            }
            Err(e) => {
                let cause = s3_status(&e);
                if cause.code != StatusCode::NoSuchFile {
                    return Err(translate::stat(path, cause));
                }
            }
        }

        // Then as a directory prefix
        let dir_key = self.dir_key(path);
        let is_dir = self
            .has_children(&dir_key, false)
            .await
            .map_err(|e| translate::stat(path, e))?;
        if is_dir {
            return Ok(Metadata::directory(SystemTime::now()));
        }

        Err(translate::stat(
            path,
            status(StatusCode::NoSuchFile, format!("no object {} in {}", key, self.bucket)),
        ))
    }

    fn list_dir(&self, path: &str) -> DirEntryStream {
        let prefix = self.dir_key(path);
        let path = path.to_string();
        let client = self.client.clone();
        let bucket = self.bucket.clone();

        Box::pin(try_stream! {
            let mut continuation_token: Option<String> = None;

            loop {
                let mut request = client
                    .list_objects_v2()
                    .bucket(&bucket)
                    .prefix(&prefix)
                    .delimiter("/");

                if let Some(token) = continuation_token.take() {
                    request = request.continuation_token(token);
                }

                let result = request
                    .send()
                    .await
                    .map_err(|e| translate::list(&path, s3_status(&e)))?;

                for obj in result.contents() {
                    if let Some(key) = obj.key() {
                        // Skip directory marker objects
                        if key.ends_with('/') || key == prefix {
                            continue;
                        }
                        let rel_key = key.strip_prefix(prefix.as_str()).unwrap_or(key);
                        if rel_key.contains('/') {
                            continue;
                        }
                        yield DirEntry::file(rel_key);
                    }
                }

                for common_prefix in result.common_prefixes() {
                    if let Some(p) = common_prefix.prefix() {
                        let rel_prefix = p.strip_prefix(prefix.as_str()).unwrap_or(p);
                        let name = rel_prefix.trim_end_matches('/');
                        if !name.is_empty() {
                            yield DirEntry::directory(name);
                        }
                    }
                }

                if result.is_truncated().unwrap_or(false) {
                    continuation_token = result.next_continuation_token().map(|s| s.to_string());
                } else {
                    break;
                }
            }
        })
    }

    async fn read_link(&self, path: &str) -> Result<String> {
        self.stat(path).await.map_err(|e| match e {
            VfsError::NoSuchFile { cause, .. } => translate::read_link(path, cause),
            other => other,
        })?;
        Err(translate::read_link(
            path,
            status(StatusCode::OpUnsupported, "S3 has no symbolic links"),
        ))
    }

    async fn change_dir(&self, path: &str) -> Result<String> {
        let meta = self.stat(path).await.map_err(|e| match e {
            VfsError::NoSuchFile { cause, .. } => translate::change_dir(path, cause),
            other => other,
        })?;
        if !meta.is_dir() {
            return Err(translate::change_dir(
                path,
                status(StatusCode::Failure, "not a directory"),
            ));
        }
        Ok(format!("/{}", path.trim_matches('/')))
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        // Directories are virtual; a zero-byte marker keeps empty ones visible
        let key = self.dir_key(path);
        debug!("create_dir: path={} key={}", path, key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(Vec::new()))
            .send()
            .await
            .map_err(|e| translate::create_dir(path, s3_status(&e)))?;
        Ok(())
    }

    async fn remove(&self, path: &str, is_dir: bool) -> Result<()> {
        debug!("remove: path={} is_dir={}", path, is_dir);

        if !is_dir {
            // DeleteObject succeeds for missing keys
            let key = self.path_to_key(path);
            self.head_key(&key)
                .await
                .map_err(|e| translate::delete(path, false, e))?;
            return self
                .delete_object(&key)
                .await
                .map_err(|e| translate::delete(path, false, e));
        }

        let key = self.dir_key(path);
        let not_empty = self
            .has_children(&key, true)
            .await
            .map_err(|e| translate::delete(path, true, e))?;
        if not_empty {
            return Err(translate::delete(
                path,
                true,
                status(StatusCode::Failure, "directory not empty"),
            ));
        }
        self.delete_object(&key)
            .await
            .map_err(|e| translate::delete(path, true, e))
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        let key = self.path_to_key(path);
        trace!("read: path={} key={}", path, key);

        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| translate::read(path, s3_status(&e)))?;

        let body = result.body.collect().await.map_err(|e| {
            translate::read(path, status(StatusCode::ConnectionLost, e.to_string()))
        })?;
        Ok(body.into_bytes())
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let key = self.path_to_key(path);
        debug!("write: path={} key={} size={}", path, key, data.len());

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(|e| translate::write(path, s3_status(&e)))?;
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        let (from_key, to_key) = (self.path_to_key(from), self.path_to_key(to));
        debug!("copy: from={} to={}", from_key, to_key);
        self.copy_object(&from_key, &to_key)
            .await
            .map_err(|e| translate::copy(from, to, e))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        // No native rename; copy then delete the source
        let (from_key, to_key) = (self.path_to_key(from), self.path_to_key(to));
        debug!("rename: from={} to={}", from_key, to_key);
        self.copy_object(&from_key, &to_key)
            .await
            .map_err(|e| translate::rename(from, to, e))?;
        self.delete_object(&from_key)
            .await
            .map_err(|e| translate::rename(from, to, e))
    }

    async fn set_owner(&self, _path: &str, _uid: u32) -> Result<()> {
        Err(VfsError::NotSupported("S3 objects have no owner".to_string()))
    }

    async fn set_group(&self, _path: &str, _gid: u32) -> Result<()> {
        Err(VfsError::NotSupported("S3 objects have no group".to_string()))
    }

    async fn set_permissions(&self, path: &str, mode: u32) -> Result<()> {
        let key = self.path_to_key(path);
        debug!("set_permissions: path={} key={} mode={:o}", path, key, mode);

        // Metadata is immutable; copy the object onto itself with the new mode
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .key(&key)
            .copy_source(format!("{}/{}", self.bucket, key))
            .metadata_directive(MetadataDirective::Replace)
            .set_metadata(Some(Self::mode_to_metadata(mode & 0o7777)))
            .send()
            .await
            .map_err(|e| translate::set_permissions(path, s3_status(&e)))?;
        Ok(())
    }

    async fn set_mtime(&self, _path: &str, _mtime: SystemTime) -> Result<()> {
        Err(VfsError::NotSupported(
            "S3 modification times are set by the service".to_string(),
        ))
    }

    async fn close(&self) -> Result<()> {
        info!("Closing S3 mount for bucket {}", self.bucket);
        Ok(())
    }
}

/// Provider registered under the `s3` scheme (and its `s3a` alias)
pub struct S3Provider;

#[async_trait]
impl FileSystemProvider for S3Provider {
    async fn open(&self, config: FileSystemConfiguration) -> Result<std::sync::Arc<dyn FileSystem>> {
        Ok(std::sync::Arc::new(S3FileSystem::new(config).await?))
    }
}
