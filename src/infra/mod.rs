//! Infrastructure adapters: logging, metrics and the remote posts API.

pub mod error;
pub mod posts_api;
pub mod telemetry;
