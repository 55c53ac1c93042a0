//! The crate's error type.
//!
//! Every fallible operation in this crate returns [`Error`], which pairs an
//! [`ErrorKind`] (used by `main` to pick a process exit code per the error
//! table) with a human-readable message. This mirrors the teacher's
//! `Errno`/`Error` split rather than a bare `String` or `anyhow::Error`
//! everywhere, so callers can match on the kind without string-sniffing.

use std::fmt;

/// Coarse classification of a failure, one variant per row of the error
/// table. `main` maps these to process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Incompatible flag pair, unknown SoC, or other misconfiguration
    /// caught before any I/O.
    Configuration,
    /// The BUP is missing entries required for this TNSPEC.
    BupMalformed,
    /// A required partition is absent in the GPT and by-label directory.
    PartitionMissing,
    /// A payload is larger than its destination partition.
    SizeOverflow,
    /// An external BCT validator rejected a candidate.
    BctValidation,
    /// The version/rollback gate rejected the update.
    VersionGate,
    /// A read, write, seek, or flush failed.
    Io,
    /// An internal invariant was violated (e.g. wrong BCT variant for SoC).
    Internal,
}

impl ErrorKind {
    /// The process exit code this kind maps to, per §7 of the spec.
    pub fn exit_code(self) -> i32 {
        1
    }
}

/// The crate's error type: a kind plus a message.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    msg: String,
}

impl Error {
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Error {
            kind,
            msg: msg.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, msg)
    }

    pub fn bup_malformed(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::BupMalformed, msg)
    }

    pub fn partition_missing(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::PartitionMissing, msg)
    }

    pub fn size_overflow(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::SizeOverflow, msg)
    }

    pub fn bct_validation(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::BctValidation, msg)
    }

    pub fn version_gate(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::VersionGate, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, msg)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
