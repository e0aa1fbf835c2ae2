//! podbridge gateway: HTTP surface, device transport and recognizer client
//! wired around the session pool and streaming pipeline.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod devices;
pub mod recognizer;
pub mod state;

pub use state::AppState;
