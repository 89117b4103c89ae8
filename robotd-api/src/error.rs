//! Defines the error type used throughout the `robotd` codebase.

use std::fmt;

/// Enumerates the errors that can be reported by `robotd`. Drivers
/// and framework code should map their failures onto one of these
/// values; the associated string carries the detail a log line needs.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A resource (device, socket path, worker) could not be found.
    NotFound(String),

    /// A bad parameter was given in a driver configuration, or a
    /// required parameter was missing.
    BadConfig(String),

    /// The driver's `start()` failed to bring up the underlying
    /// hardware. Fatal for the worker process hosting it.
    Hardware(String),

    /// A client sent a frame that could not be decoded as JSON.
    Protocol(String),

    /// A filesystem operation (socket bind, directory creation,
    /// permission change) failed.
    Io(String),

    /// A background operation couldn't complete because the other
    /// end of a channel has gone away.
    MissingPeer(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(v) => write!(f, "not found: {}", v),
            Error::BadConfig(v) => write!(f, "bad configuration: {}", v),
            Error::Hardware(v) => write!(f, "hardware error: {}", v),
            Error::Protocol(v) => write!(f, "protocol error: {}", v),
            Error::Io(v) => write!(f, "i/o error: {}", v),
            Error::MissingPeer(v) => write!(f, "{} is missing peer", v),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Protocol(e.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_e: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::MissingPeer(String::from("request channel is closed"))
    }
}
