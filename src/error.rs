//! Error types for StripeFS

use thiserror::Error;

use crate::driver::Operation;

/// Result type alias using StripeFS Error
pub type Result<T> = std::result::Result<T, Error>;

/// StripeFS error types
#[derive(Error, Debug)]
pub enum Error {
    /// IO error from one of the physical stripes
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error (rejected before mount)
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// Operation outside the implemented set
    #[error("Operation not supported: {0}")]
    Unsupported(Operation),

    /// Invalid argument passed by the caller
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Convert to libc error code for FUSE
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            Error::Io(e) => e.raw_os_error().unwrap_or_else(|| io_kind_errno(e.kind())),
            Error::Unsupported(_) => libc::ENOSYS,
            Error::InvalidArgument(_) => libc::EINVAL,
            _ => libc::EIO,
        }
    }
}

/// Errno for synthesized IO errors that carry no OS code
fn io_kind_errno(kind: std::io::ErrorKind) -> libc::c_int {
    use std::io::ErrorKind;

    match kind {
        ErrorKind::NotFound => libc::ENOENT,
        ErrorKind::PermissionDenied => libc::EACCES,
        ErrorKind::AlreadyExists => libc::EEXIST,
        ErrorKind::InvalidInput => libc::EINVAL,
        ErrorKind::WriteZero => libc::ENOSPC,
        _ => libc::EIO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_os_errno_is_preserved() {
        let err = Error::from(io::Error::from_raw_os_error(libc::ENOSPC));
        assert_eq!(err.to_errno(), libc::ENOSPC);

        let err = Error::from(io::Error::from_raw_os_error(libc::EACCES));
        assert_eq!(err.to_errno(), libc::EACCES);
    }

    #[test]
    fn test_synthesized_io_errors() {
        let err = Error::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.to_errno(), libc::ENOENT);

        let err = Error::from(io::Error::new(io::ErrorKind::WriteZero, "short"));
        assert_eq!(err.to_errno(), libc::ENOSPC);
    }

    #[test]
    fn test_unsupported_maps_to_enosys() {
        let err = Error::Unsupported(Operation::Symlink);
        assert_eq!(err.to_errno(), libc::ENOSYS);
        assert_eq!(err.to_string(), "Operation not supported: symlink");
    }

    #[test]
    fn test_config_error_is_eio() {
        assert_eq!(Error::Config("bad".into()).to_errno(), libc::EIO);
    }
}
