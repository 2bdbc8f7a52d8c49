//! Client-side real-time layer: push events reconciled into the query cache.
//!
//! The platform's client state is driven by cached pull fetches. This crate
//! adds the second update path, server-pushed events, and keeps the two
//! consistent.
//!
//! # Architecture
//!
//! - **Single connection per identity**: [`ConnectionManager`] owns at most one
//!   push connection and recreates it whenever the signed-in identity changes.
//! - **Dispatch table**: [`EventRouter`] maps event type names to handlers and
//!   skips types it does not know.
//! - **Reconcilers**: one handler per event type merges the event into
//!   existing cache entries through the [`cache::QueryCache`] port. They never
//!   invent entries a pull fetch has not produced; they invalidate instead.
//! - **Pluggable transport**: [`Transport`] abstracts the push source;
//!   [`SseTransport`] is the Server-Sent Events implementation.
//!
//! # Event Flow
//!
//! 1. `set_identity` is called with a user and credential
//! 2. The manager opens a channel through the transport
//! 3. On `Connected`, the client joins its cached conversation set
//! 4. Each `Event` signal is dispatched inline, one at a time, in arrival order
//! 5. Reconcilers update cache entries; subscribers of those entries wake up
//!
//! # Failure Handling
//!
//! - Connect errors are logged and reflected in the status, never fatal
//! - Missing cache entries lead to invalidation, i.e. a normal pull fetch
//! - Duplicate deliveries are absorbed by identifier checks
//! - After a dropped stream comes back, every cached entry is invalidated,
//!   since events pushed while offline were lost
//!
//! # Modules
//!
//! - `connection`: lifecycle manager, identity and status types
//! - `router`: event type to handler dispatch
//! - `reconcile`: message and notification handlers
//! - `transport`: transport trait, signals and credentials
//! - `sse_client`: Server-Sent Events transport

pub mod connection;
pub mod error;
pub mod reconcile;
pub mod router;
pub mod sse_client;
pub mod transport;

pub use connection::{ConnectionManager, ConnectionStatus, Identity};
pub use router::{Dispatch, EventHandler, EventRouter};
pub use sse_client::{ReconnectSettings, SseTransport};
pub use transport::{Channel, Credential, JoinRequest, Signal, Transport};
