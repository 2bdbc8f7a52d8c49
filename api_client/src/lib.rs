//! Pull side of the client cache: fetches query data from the platform's
//! REST endpoints and refills entries that were invalidated.

pub mod error;
pub mod pull;
pub mod refetch;

pub use error::{Error, ErrorKind};
pub use pull::{Fetch, PullClient};
pub use refetch::{prime, refetch, spawn_refetcher};
