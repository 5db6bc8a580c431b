//! remote-vfs: a URI-addressable virtual filesystem over remote backends
//!
//! Remote storage is mounted under a URI key such as
//! `sftp://deploy@files.example.org:22/data` or `s3://minio:9000/logs`, and
//! request URIs are routed to the mount that serves them.
//!
//! # Architecture
//!
//! - **Registry**: Owns every mount. [`registry::Builder`] collects options,
//!   `resolve` maps a URI onto a mount and an in-mount path.
//! - **Connectors**: Backends implementing the [`connector::FileSystem`]
//!   trait (SFTP and S3).
//! - **Pool**: Bounded, idle-evicting pool of live backend channels shared by
//!   concurrent operations on one mount.
//! - **Translator**: Maps backend status codes onto the crate's error kinds
//!   so every backend fails the same way.
//!
//! # Example
//!
//! ```no_run
//! use remote_vfs::registry::FileSystemRegistry;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = FileSystemRegistry::new();
//! registry
//!     .builder("sftp")
//!     .host("files.example.org")
//!     .port(22)
//!     .credentials("deploy", "hunter2")
//!     .bucket("data")
//!     .build()
//!     .await?;
//!
//! let file = registry.resolve("sftp://deploy@files.example.org/data/report.csv")?;
//! let contents = file.read().await?;
//! println!("{} bytes", contents.len());
//!
//! registry.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connector;
pub mod env;
pub mod error;
pub mod mount;
pub mod path;
pub mod pool;
pub mod registry;
pub mod translate;

pub use error::{Result, VfsError};
pub use path::ResolvedPath;
pub use registry::FileSystemRegistry;
