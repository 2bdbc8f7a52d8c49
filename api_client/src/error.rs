//! Error types for the `api_client` crate.

use std::error::Error as StdError;
use std::fmt;

/// Top-level error type for pull fetches.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Categories of pull-fetch failures.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// The request could not be built (bad URL, bad header).
    Configuration,
    Network,
    /// The server answered with a non-success status.
    Status(u16),
    /// The response body did not have the expected shape.
    Decode,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::Status(code) => write!(f, "API error: status {code}"),
            kind => write!(f, "API error: {kind:?}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let error_kind = if err.is_builder() {
            ErrorKind::Configuration
        } else if err.is_decode() {
            ErrorKind::Decode
        } else if let Some(status) = err.status() {
            ErrorKind::Status(status.as_u16())
        } else {
            ErrorKind::Network
        };
        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}
