//! Concrete device client transports.

pub mod tcp;

pub use tcp::TcpConnector;
