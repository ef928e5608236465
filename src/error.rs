//! Error type and status-code conversion.
//!
//! Every fallible operation in the crate reports failures as a negative
//! errno-style status code, the same convention the filesystem callbacks use
//! for their results. [`check`] turns such a code into a [`Result`], and the
//! constants below name the codes callers most often match on.

use std::io;
use thiserror::Error;

macro_rules! status_codes {
    ($($name:ident),* $(,)?) => {
        $(
            #[doc = concat!("Negative `", stringify!($name), "` status code.")]
            pub const $name: i32 = -libc::$name;
        )*

        fn name_of(errno: i32) -> Option<&'static str> {
            match errno {
                $(libc::$name => Some(stringify!($name)),)*
                _ => None,
            }
        }
    };
}

status_codes!(
    EPERM, ENOENT, ESRCH, EINTR, EIO, ENXIO, E2BIG, EBADF, EAGAIN, ENOMEM, EACCES, EFAULT,
    EBUSY, EEXIST, EXDEV, ENODEV, ENOTDIR, EISDIR, EINVAL, ENFILE, EMFILE, ENOTTY, EFBIG,
    ENOSPC, ESPIPE, EROFS, EMLINK, EPIPE, ERANGE, ENAMETOOLONG, ENOSYS, ENOTEMPTY, ELOOP,
    ECANCELED, ETIMEDOUT, ENOTSUP,
);

/// Error type for loop, handle, thread and request operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A negative status code reported by the loop or the OS.
    #[error("{name}: {source}")]
    Status {
        code: i32,
        name: &'static str,
        #[source]
        source: io::Error,
    },

    /// The caller passed something the operation cannot work with.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A joined thread terminated by panicking.
    #[error("thread panicked before completing")]
    ThreadPanicked,
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Builds an error from a negative status code.
    ///
    /// Positive values are accepted too and treated as the matching errno.
    pub fn from_status(code: i32) -> Self {
        let errno = code.wrapping_abs();
        Error::Status {
            code: -errno,
            name: err_name(-errno),
            source: io::Error::from_raw_os_error(errno),
        }
    }

    /// The negative status code carried by this error.
    ///
    /// Non-status variants map to the closest errno (`EINVAL` for bad
    /// arguments, `EIO` for a panicked thread).
    pub fn code(&self) -> i32 {
        match self {
            Error::Status { code, .. } => *code,
            Error::InvalidArgument(_) => EINVAL,
            Error::ThreadPanicked => EIO,
        }
    }

    /// Symbolic name of the status code, such as `"ENOENT"`.
    pub fn name(&self) -> &'static str {
        err_name(self.code())
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        match err.raw_os_error() {
            Some(errno) => Error::from_status(-errno),
            None => Error::Status {
                code: EIO,
                name: "EIO",
                source: err,
            },
        }
    }
}

/// Converts a status code into a result.
///
/// Negative codes become [`Error::Status`]; anything else is returned as-is.
pub fn check(status: i32) -> Result<i32> {
    if status < 0 {
        Err(Error::from_status(status))
    } else {
        Ok(status)
    }
}

/// Symbolic name for a negative status code, or `"UNKNOWN"`.
pub fn err_name(code: i32) -> &'static str {
    name_of(code.wrapping_neg()).unwrap_or("UNKNOWN")
}

/// Human readable message for a negative status code.
pub fn strerror(code: i32) -> String {
    io::Error::from_raw_os_error(code.wrapping_neg()).to_string()
}

/// Status code for the calling thread's current `errno`.
pub(crate) fn last_status() -> i32 {
    -io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn check_passes_non_negative_through() {
        assert_eq!(check(0).unwrap(), 0);
        assert_eq!(check(17).unwrap(), 17);
    }

    #[test]
    fn check_converts_negative_status() {
        let err = check(ENOENT).unwrap_err();
        assert_eq!(err.code(), ENOENT);
        assert_eq!(err.name(), "ENOENT");
        assert!(err.to_string().starts_with("ENOENT: "));
    }

    #[test]
    fn status_error_has_io_source() {
        let err = Error::from_status(EBUSY);
        let source = err.source().expect("status errors carry a source");
        assert!(source.is::<io::Error>());
    }

    #[test]
    fn positive_errno_is_normalised() {
        let err = Error::from_status(libc::EACCES);
        assert_eq!(err.code(), EACCES);
    }

    #[test]
    fn unknown_code_has_placeholder_name() {
        assert_eq!(err_name(-99_999), "UNKNOWN");
        assert_eq!(err_name(ECANCELED), "ECANCELED");
    }

    #[test]
    fn invalid_argument_maps_to_einval() {
        let err = Error::InvalidArgument("loop");
        assert_eq!(err.code(), EINVAL);
        assert!(err.source().is_none());
    }

    #[test]
    fn io_error_conversion_keeps_errno() {
        let err: Error = io::Error::from_raw_os_error(libc::ENOTDIR).into();
        assert_eq!(err.code(), ENOTDIR);
    }
}
