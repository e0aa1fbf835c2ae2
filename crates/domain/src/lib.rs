//! Shared types for podbridge: configuration, the common error type and
//! structured trace events.

pub mod config;
pub mod error;
pub mod trace;

pub use error::{Error, Result};
