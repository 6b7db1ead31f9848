//! Error types for the pager and B-tree.

use std::fmt;

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// POSIX-flavored error code carried by every [`Error`] and every trace
/// frame. These are the codes named explicitly in the pager contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid argument — a zero page id, or a precondition violation.
    EInval,
    /// Allocation failed, or eviction swept without finding a candidate.
    ENoMem,
    /// Key already present where uniqueness was required.
    EExist,
    /// Key not found.
    ENoEnt,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::EInval => "EINVAL",
            ErrorCode::ENoMem => "ENOMEM",
            ErrorCode::EExist => "EEXIST",
            ErrorCode::ENoEnt => "ENOENT",
        };
        f.write_str(name)
    }
}

/// All possible errors raised by the pager and B-tree.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The provided page id is zero.
    #[error("invalid page id: {0}")]
    InvalidPageId(u32),

    /// Some other precondition was violated (bad `open` arguments, a
    /// malformed UUID string, and the like).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No frame could be allocated and eviction could not free one.
    #[error("no pages to evict")]
    NoMemory,

    /// Insert found an existing cell for the key.
    #[error("key already exists")]
    KeyExists,

    /// Lookup did not find a cell for the key.
    #[error("key not found")]
    NotFound,
}

impl Error {
    /// The POSIX-flavored code this error corresponds to.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidPageId(_) => ErrorCode::EInval,
            Error::InvalidArgument(_) => ErrorCode::EInval,
            Error::NoMemory => ErrorCode::ENoMem,
            Error::KeyExists => ErrorCode::EExist,
            Error::NotFound => ErrorCode::ENoEnt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_condition() {
        assert_eq!(format!("{}", Error::InvalidPageId(0)), "invalid page id: 0");
        assert_eq!(format!("{}", Error::NoMemory), "no pages to evict");
    }

    #[test]
    fn code_mapping() {
        assert_eq!(Error::InvalidPageId(0).code(), ErrorCode::EInval);
        assert_eq!(Error::NoMemory.code(), ErrorCode::ENoMem);
        assert_eq!(Error::KeyExists.code(), ErrorCode::EExist);
        assert_eq!(Error::NotFound.code(), ErrorCode::ENoEnt);
    }

    #[test]
    fn traced_macro_records_a_frame() {
        use crate::common::trace;

        trace::clear();
        let err = crate::traced!(Error::NoMemory);
        assert!(matches!(err, Error::NoMemory));
        assert_eq!(trace::first_code(), Some(ErrorCode::ENoMem));
        assert_eq!(trace::frame_count(), 1);
        trace::clear();
    }
}
