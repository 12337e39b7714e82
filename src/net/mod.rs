//! Network layer: typed sockets, addresses, buffers and readiness polling.
//!
//! This module wraps the operating-system socket interface in a small,
//! typed API. Nothing here knows about HTTP; the `http` and `server`
//! modules are built on top of it.
//!
//! # Design
//!
//! - [`Socket`] owns a file descriptor exclusively and releases it on drop.
//!   Expected I/O conditions (would-block, end of stream) are explicit
//!   outcome variants, not errors.
//! - [`Address`] is the IP + port + family value used everywhere a peer or
//!   listener endpoint is named.
//! - [`DataBuffer`] is the append-only byte container the per-connection
//!   read path accumulates into.
//! - [`poll`] is the readiness-wait primitive the reactor blocks in.

pub mod addr;
pub mod buf;
pub mod poll;
pub mod socket;

pub use addr::{Address, Family};
pub use buf::DataBuffer;
pub use poll::{Interest, PollSet};
pub use socket::{Protocol, ReadOutcome, Socket, WriteOutcome};

use std::fmt;
use std::io;

/// Result type for network operations
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a socket-layer failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Create,
    Bind,
    Listen,
    Accept,
    Connect,
    Read,
    Write,
    PartialWrite,
    Option,
    Poll,
    ProtocolMismatch,
    Unsupported,
    InvalidAddress,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Create => "create",
            ErrorKind::Bind => "bind",
            ErrorKind::Listen => "listen",
            ErrorKind::Accept => "accept",
            ErrorKind::Connect => "connect",
            ErrorKind::Read => "read",
            ErrorKind::Write => "write",
            ErrorKind::PartialWrite => "partial write",
            ErrorKind::Option => "option",
            ErrorKind::Poll => "poll",
            ErrorKind::ProtocolMismatch => "protocol mismatch",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::InvalidAddress => "invalid address",
        };
        f.write_str(name)
    }
}

/// Socket-layer error: what failed, where, and what the OS said.
#[derive(Debug, thiserror::Error)]
#[error("{kind} failed ({context}): {os_message}")]
pub struct Error {
    kind: ErrorKind,
    context: String,
    os_message: String,
}

impl Error {
    /// Build an error from the last OS error for this thread.
    pub(crate) fn last_os(kind: ErrorKind, context: impl Into<String>) -> Self {
        Error::os(kind, context, io::Error::last_os_error())
    }

    /// Build an error from a captured `io::Error`.
    pub(crate) fn os(kind: ErrorKind, context: impl Into<String>, err: io::Error) -> Self {
        Error {
            kind,
            context: context.into(),
            os_message: err.to_string(),
        }
    }

    /// Build an error that did not originate in a system call.
    pub(crate) fn new(
        kind: ErrorKind,
        context: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error {
            kind,
            context: context.into(),
            os_message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    /// The OS-level message, or a descriptive message for errors that did
    /// not come from a system call.
    pub fn os_message(&self) -> &str {
        &self.os_message
    }
}
