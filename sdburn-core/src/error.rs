use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the disk management and burning layers.
#[derive(Error, Debug)]
pub enum Error {
    /// Zero or several mutually exclusive identifiers were supplied, or a
    /// required one is missing.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A disk, volume or mount letter does not exist in the current enumeration.
    #[error("not found: {0}")]
    NotFound(String),

    /// More than one removable device qualifies where exactly one is required.
    #[error(
        "{0} healthy removable volumes found; remove all but the card to burn and try again"
    )]
    AmbiguousTarget(usize),

    /// A row or block of tool output could not be interpreted.
    #[error("malformed {what}: {detail}")]
    Malformed { what: &'static str, detail: String },

    /// An external utility exited unsuccessfully.
    #[error("{tool} failed ({status}): {output}")]
    ExternalTool {
        tool: String,
        status: String,
        output: String,
    },

    /// The user declined an interactive confirmation before a destructive step.
    #[error("operation declined: {0}")]
    Declined(String),

    /// The raw copy started but did not finish. The target is in an undefined state.
    #[error(
        "write to {device} stopped after {written} of {total} bytes; the device contents are undefined"
    )]
    IncompleteWrite {
        device: PathBuf,
        written: u64,
        total: u64,
        #[source]
        source: Box<Error>,
    },

    #[error("verification failed: hash mismatch")]
    VerificationFailed,

    #[error("operation cancelled by user")]
    Cancelled,

    #[error("not supported on this platform: {0}")]
    Unsupported(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
