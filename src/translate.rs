//! Protocol status translation
//!
//! Backends report failures as SFTP-style status codes. Every filesystem
//! operation routes those through one mapping into the portable
//! [`VfsError`] kinds, so callers see `NoSuchFile` / `AccessDenied` /
//! `FileSystem` regardless of which backend produced the failure.
//!
//! The one exception is [`read_link`]: a link that cannot be read for any
//! reason other than "missing" or "forbidden" is reported as
//! [`VfsError::NotLink`].

use std::fmt;

use thiserror::Error;

use crate::error::VfsError;

/// SFTP status codes (draft-ietf-secsh-filexfer-02, section 7)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    Eof,
    NoSuchFile,
    PermissionDenied,
    Failure,
    BadMessage,
    NoConnection,
    ConnectionLost,
    OpUnsupported,
    /// Codes from later protocol revisions pass through untouched
    Other(u32),
}

impl StatusCode {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => StatusCode::Ok,
            1 => StatusCode::Eof,
            2 => StatusCode::NoSuchFile,
            3 => StatusCode::PermissionDenied,
            4 => StatusCode::Failure,
            5 => StatusCode::BadMessage,
            6 => StatusCode::NoConnection,
            7 => StatusCode::ConnectionLost,
            8 => StatusCode::OpUnsupported,
            other => StatusCode::Other(other),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            StatusCode::Ok => 0,
            StatusCode::Eof => 1,
            StatusCode::NoSuchFile => 2,
            StatusCode::PermissionDenied => 3,
            StatusCode::Failure => 4,
            StatusCode::BadMessage => 5,
            StatusCode::NoConnection => 6,
            StatusCode::ConnectionLost => 7,
            StatusCode::OpUnsupported => 8,
            StatusCode::Other(code) => *code,
        }
    }

    /// Whether the code says the channel itself is unusable
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, StatusCode::NoConnection | StatusCode::ConnectionLost)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusCode::Ok => "SSH_FX_OK",
            StatusCode::Eof => "SSH_FX_EOF",
            StatusCode::NoSuchFile => "SSH_FX_NO_SUCH_FILE",
            StatusCode::PermissionDenied => "SSH_FX_PERMISSION_DENIED",
            StatusCode::Failure => "SSH_FX_FAILURE",
            StatusCode::BadMessage => "SSH_FX_BAD_MESSAGE",
            StatusCode::NoConnection => "SSH_FX_NO_CONNECTION",
            StatusCode::ConnectionLost => "SSH_FX_CONNECTION_LOST",
            StatusCode::OpUnsupported => "SSH_FX_OP_UNSUPPORTED",
            StatusCode::Other(code) => return write!(f, "status {}", code),
        };
        f.write_str(name)
    }
}

impl From<russh_sftp::protocol::StatusCode> for StatusCode {
    fn from(code: russh_sftp::protocol::StatusCode) -> Self {
        use russh_sftp::protocol::StatusCode as Sftp;

        match code {
            Sftp::Ok => StatusCode::Ok,
            Sftp::Eof => StatusCode::Eof,
            Sftp::NoSuchFile => StatusCode::NoSuchFile,
            Sftp::PermissionDenied => StatusCode::PermissionDenied,
            Sftp::Failure => StatusCode::Failure,
            Sftp::BadMessage => StatusCode::BadMessage,
            Sftp::NoConnection => StatusCode::NoConnection,
            Sftp::ConnectionLost => StatusCode::ConnectionLost,
            Sftp::OpUnsupported => StatusCode::OpUnsupported,
        }
    }
}

/// A backend status code plus the server's message, kept as the error cause
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct StatusError {
    pub code: StatusCode,
    pub message: String,
}

impl StatusError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Core mapping shared by every operation
pub fn map(reason: &str, cause: StatusError, path: &str, other: Option<&str>) -> VfsError {
    let reason = reason.to_string();
    let path = path.to_string();
    let other = other.map(str::to_string);

    match cause.code {
        StatusCode::NoSuchFile => VfsError::NoSuchFile {
            reason,
            path,
            other,
            cause,
        },
        StatusCode::PermissionDenied => VfsError::AccessDenied {
            reason,
            path,
            other,
            cause,
        },
        _ => VfsError::FileSystem {
            reason,
            path,
            other,
            cause,
        },
    }
}

pub fn stat(path: &str, cause: StatusError) -> VfsError {
    map("stat", cause, path, None)
}

pub fn list(path: &str, cause: StatusError) -> VfsError {
    map("list directory", cause, path, None)
}

pub fn change_dir(path: &str, cause: StatusError) -> VfsError {
    map("change directory to", cause, path, None)
}

pub fn create_dir(path: &str, cause: StatusError) -> VfsError {
    map("create directory", cause, path, None)
}

/// `is_directory` only changes the message
pub fn delete(path: &str, is_directory: bool, cause: StatusError) -> VfsError {
    let reason = if is_directory {
        "delete directory"
    } else {
        "delete file"
    };
    map(reason, cause, path, None)
}

pub fn read(path: &str, cause: StatusError) -> VfsError {
    map("open for reading", cause, path, None)
}

pub fn write(path: &str, cause: StatusError) -> VfsError {
    map("open for writing", cause, path, None)
}

pub fn copy(from: &str, to: &str, cause: StatusError) -> VfsError {
    map("copy", cause, from, Some(to))
}

pub fn rename(from: &str, to: &str, cause: StatusError) -> VfsError {
    map("move", cause, from, Some(to))
}

pub fn set_owner(path: &str, cause: StatusError) -> VfsError {
    map("set owner of", cause, path, None)
}

pub fn set_group(path: &str, cause: StatusError) -> VfsError {
    map("set group of", cause, path, None)
}

pub fn set_permissions(path: &str, cause: StatusError) -> VfsError {
    map("set permissions of", cause, path, None)
}

pub fn set_mtime(path: &str, cause: StatusError) -> VfsError {
    map("set modification time of", cause, path, None)
}

pub fn read_link(path: &str, cause: StatusError) -> VfsError {
    match cause.code {
        StatusCode::NoSuchFile | StatusCode::PermissionDenied => {
            map("read link", cause, path, None)
        }
        _ => VfsError::NotLink {
            path: path.to_string(),
            cause,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: StatusCode) -> StatusError {
        StatusError::new(code, "server said no")
    }

    const OTHER_CODES: [StatusCode; 7] = [
        StatusCode::Eof,
        StatusCode::Failure,
        StatusCode::BadMessage,
        StatusCode::NoConnection,
        StatusCode::ConnectionLost,
        StatusCode::OpUnsupported,
        StatusCode::Other(42),
    ];

    #[test]
    fn test_read_link_missing_and_denied_use_core_mapping() {
        assert!(matches!(
            read_link("/l", status(StatusCode::NoSuchFile)),
            VfsError::NoSuchFile { path, .. } if path == "/l"
        ));
        assert!(matches!(
            read_link("/l", status(StatusCode::PermissionDenied)),
            VfsError::AccessDenied { .. }
        ));
    }

    #[test]
    fn test_read_link_other_codes_are_not_link() {
        for code in OTHER_CODES {
            match read_link("/l", status(code)) {
                VfsError::NotLink { path, cause } => {
                    assert_eq!(path, "/l");
                    assert_eq!(cause.code, code);
                }
                other => panic!("expected NotLink for {}, got {:?}", code, other),
            }
        }
    }

    #[test]
    fn test_uniform_mapping_for_single_path_operations() {
        let ops: [fn(&str, StatusError) -> VfsError; 12] = [
            stat,
            list,
            change_dir,
            create_dir,
            |p, c| delete(p, false, c),
            |p, c| delete(p, true, c),
            read,
            write,
            set_owner,
            set_group,
            set_permissions,
            set_mtime,
        ];

        for op in ops {
            assert!(matches!(
                op("/a", status(StatusCode::NoSuchFile)),
                VfsError::NoSuchFile { other: None, .. }
            ));
            assert!(matches!(
                op("/a", status(StatusCode::PermissionDenied)),
                VfsError::AccessDenied { other: None, .. }
            ));
            for code in OTHER_CODES {
                assert!(matches!(
                    op("/a", status(code)),
                    VfsError::FileSystem { other: None, .. }
                ));
            }
        }
    }

    #[test]
    fn test_copy_and_move_carry_both_paths() {
        match copy("/src", "/dst", status(StatusCode::NoSuchFile)) {
            VfsError::NoSuchFile { path, other, .. } => {
                assert_eq!(path, "/src");
                assert_eq!(other.as_deref(), Some("/dst"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let err = rename("/src", "/dst", status(StatusCode::Failure));
        assert!(matches!(err, VfsError::FileSystem { ref other, .. } if other.as_deref() == Some("/dst")));
        assert_eq!(
            err.to_string(),
            "move /src to /dst: SSH_FX_FAILURE: server said no"
        );
    }

    #[test]
    fn test_delete_flag_only_changes_message() {
        let file = delete("/x", false, status(StatusCode::PermissionDenied));
        let dir = delete("/x", true, status(StatusCode::PermissionDenied));
        assert!(matches!(file, VfsError::AccessDenied { .. }));
        assert!(matches!(dir, VfsError::AccessDenied { .. }));
        assert_eq!(file.to_string(), "delete file /x: access denied");
        assert_eq!(dir.to_string(), "delete directory /x: access denied");
    }

    #[test]
    fn test_status_code_round_trip_numbering() {
        assert_eq!(StatusCode::from_code(2), StatusCode::NoSuchFile);
        assert_eq!(StatusCode::from_code(99), StatusCode::Other(99));
        assert_eq!(StatusCode::PermissionDenied.code(), 3);
        assert!(StatusCode::ConnectionLost.is_connection_failure());
        assert!(!StatusCode::Failure.is_connection_failure());
    }
}
