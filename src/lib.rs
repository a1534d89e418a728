//! Cachet: a tagged cache-aside layer in front of a slow remote source.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
