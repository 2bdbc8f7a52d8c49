//! The push-event source as seen by the connection lifecycle manager.
//!
//! A transport turns a credential into a [`Channel`] of [`Signal`]s and can
//! declare which conversations a connection is interested in. Reconnection and
//! backoff are the transport's business; it reports them as `Connected`,
//! `Disconnected` and `ConnectError` signals.

use crate::error::Error;
use async_trait::async_trait;
use events::{Id, RawEvent};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

/// Bearer credential of the signed-in user.
#[derive(Clone)]
pub struct Credential(SecretString);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::new(token.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for Credential {}

/// Announces which conversation streams the server should address to a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinRequest {
    pub user_id: Id,
    pub conversation_ids: Vec<Id>,
}

/// Everything a transport reports while a channel is open.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// The handshake completed (first time or after a reconnect).
    Connected,
    /// A live stream dropped. The transport may reconnect on its own.
    Disconnected,
    /// A connection attempt failed. Carries a human-readable reason only.
    ConnectError(String),
    Event(RawEvent),
}

/// Receiving end of an open push channel.
///
/// Dropping the channel stops delivery: the transport's reader task, if any,
/// is aborted.
pub struct Channel {
    signals: UnboundedReceiver<Signal>,
    reader: Option<JoinHandle<()>>,
}

impl Channel {
    pub fn new(signals: UnboundedReceiver<Signal>) -> Self {
        Self {
            signals,
            reader: None,
        }
    }

    /// Ties the lifetime of a background reader task to this channel.
    pub fn with_reader(signals: UnboundedReceiver<Signal>, reader: JoinHandle<()>) -> Self {
        Self {
            signals,
            reader: Some(reader),
        }
    }

    /// Next signal, or `None` once the transport has gone away for good.
    pub async fn recv(&mut self) -> Option<Signal> {
        self.signals.recv().await
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.signals.close();
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a push channel authenticated with `credential`.
    async fn open(&self, credential: &Credential) -> Result<Channel, Error>;

    /// Declares the conversation set for the connection opened with `credential`.
    async fn join(&self, credential: &Credential, request: &JoinRequest) -> Result<(), Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential::new("super-secret-token");

        assert_eq!(format!("{credential:?}"), "Credential([REDACTED])");
        assert_eq!(credential.expose(), "super-secret-token");
    }

    #[test]
    fn test_credentials_compare_by_value() {
        assert_eq!(Credential::new("a"), Credential::new("a"));
        assert_ne!(Credential::new("a"), Credential::new("b"));
    }

    #[tokio::test]
    async fn test_dropping_channel_closes_sender_side() {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Channel::new(rx);

        drop(channel);

        assert!(tx.send(Signal::Connected).is_err());
    }

    #[tokio::test]
    async fn test_dropping_channel_aborts_reader() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(std::future::pending::<()>());
        let abort_handle = reader.abort_handle();
        let channel = Channel::with_reader(rx, reader);

        drop(channel);
        for _ in 0..100 {
            if abort_handle.is_finished() {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert!(abort_handle.is_finished());
    }
}
