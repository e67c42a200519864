//! Error categories shared across the imgdb workspace.
//!
//! One variant per abstract category from the DB's error-signal contract:
//! callers branch on category, not on message text.

use crate::ImageId;

/// Errors raised by any imgdb component.
#[derive(Debug, thiserror::Error)]
pub enum ImgdbError {
    /// Filesystem or mmap I/O failure. Fatal — propagate to caller.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// The on-disk file is structurally invalid (bad magic, size mismatch,
    /// ID/signature desync).
    #[error("data error: {0}")]
    Data(String),

    /// Lookup by an image id that isn't in the registry.
    #[error("invalid image id {0}")]
    InvalidId(ImageId),

    /// `add` called with an id already present in the registry.
    #[error("duplicate image id {0}")]
    DuplicateId(ImageId),

    /// Caller supplied a malformed argument (e.g. save to a different
    /// filename than the one the alter-mode DB was opened with).
    #[error("parameter error: {0}")]
    Param(String),

    /// The operation is not valid in the DB's current mode (e.g. `query` on
    /// an alter-mode DB, `save` on a simple-mode DB, write to a read-only
    /// alter-mode DB).
    #[error("usage error: {0}")]
    Usage(String),

    /// `mmap`/`munmap` failed outside of the plain I/O path.
    #[error("memory mapping error: {0}")]
    Memory(String),

    /// An invariant the implementation itself is responsible for was
    /// violated (misaligned offset, index/cache desync, bucket count
    /// mismatch). Should never happen; fail loudly rather than corrupt data.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ImgdbError>;
