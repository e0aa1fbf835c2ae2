//! Recognition back-end clients.

pub mod http;

pub use http::HttpRecognizer;
