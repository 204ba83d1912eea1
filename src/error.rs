//! Crate-wide error taxonomy.
//!
//! Every fallible public operation in this crate returns [`Result`], whose
//! `Err` side is this single [`Error`] enum. This is deliberately flatter
//! than a per-component error type: callers that only care about a handful
//! of cases (timeouts, closed channels) match on the relevant variants and
//! let the rest flow through `Display`/`source`.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// The result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A buffer operation needed more bytes than were remaining.
    #[error("buffer underflow")]
    BufferUnderflow,

    /// A buffer operation needed more free space than was available.
    #[error("buffer overflow")]
    BufferOverflow,

    /// The channel (or the direction of it being used) is closed.
    #[error("channel is closed")]
    Closed,

    /// The operation was cancelled before completing.
    #[error("operation cancelled")]
    Cancelled,

    /// A blocking read did not complete before its deadline.
    #[error("read timed out after {0:?}")]
    ReadTimeout(Duration),

    /// A blocking write did not complete before its deadline.
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    /// An option name or value was not recognized or not applicable to the
    /// channel it was set on.
    #[error("unsupported option: {0}")]
    UnsupportedOption(String),

    /// A message exceeded the configured maximum size for its direction.
    #[error("message of {size} bytes exceeds the {max}-byte limit")]
    OversizedMessage { size: usize, max: usize },

    /// The length-framed wire format was violated.
    #[error("framing error: {0}")]
    FramingError(String),

    /// A blocking wait was interrupted before it could complete.
    #[error("operation interrupted")]
    Interrupted,

    /// Creating a channel failed after exhausting the configured retry
    /// budget. Carries the final attempt's cause.
    #[error("failed to create channel after {attempts} tries: {cause}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        cause: Box<Error>,
    },

    /// An underlying I/O operation failed. This is the "io-failure
    /// (wrapped)" case from the error taxonomy.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub fn unsupported_option(name: impl Into<String>) -> Self {
        Error::UnsupportedOption(name.into())
    }

    pub fn framing(msg: impl Into<String>) -> Self {
        Error::FramingError(msg.into())
    }

    /// True for errors that represent "this side of the channel is no
    /// longer usable" rather than a one-off failure.
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::Closed)
    }
}
