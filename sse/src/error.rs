//! Error types for the `sse` crate.
//!
//! Follows the same pattern as the other crates with a root Error struct and error kind enums.

use std::error::Error as StdError;
use std::fmt;

/// Top-level error type for the real-time layer.
/// Holds error kind and optional source for error chaining.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Major categories of errors in the real-time layer.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    Transport(TransportErrorKind),
    Payload(PayloadErrorKind),
}

/// Errors from opening or talking to the push channel.
#[derive(Debug, PartialEq)]
pub enum TransportErrorKind {
    /// URL or header rejected before any network call was made.
    Configuration,
    Network,
    /// The server refused the join declaration.
    JoinRejected(u16),
}

/// Errors from interpreting an event payload.
#[derive(Debug, PartialEq)]
pub enum PayloadErrorKind {
    Decode,
}

impl Error {
    pub fn new(error_kind: ErrorKind) -> Self {
        Self {
            source: None,
            error_kind,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::Transport(kind) => write!(f, "Transport error: {:?}", kind)?,
            ErrorKind::Payload(kind) => write!(f, "Payload error: {:?}", kind)?,
        }
        if let Some(source) = &self.source {
            write!(f, " ({source})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Payload(PayloadErrorKind::Decode),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        // Builder errors happen before any network call is made.
        let error_kind = if err.is_builder() {
            ErrorKind::Transport(TransportErrorKind::Configuration)
        } else {
            ErrorKind::Transport(TransportErrorKind::Network)
        };
        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

impl From<eventsource_client::Error> for Error {
    fn from(err: eventsource_client::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Transport(TransportErrorKind::Configuration),
        }
    }
}
