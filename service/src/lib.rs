//! Process-level plumbing shared by the client binary: configuration and logging.

pub mod config;
pub mod logging;
