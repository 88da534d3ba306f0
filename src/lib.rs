//! Reusable single-host HTTP connection wrapper.
//!
//! [`http::ConnectionWrapper`] keeps zero or one open connection to a host,
//! opens it lazily, reconnects and retries on transport failures up to a fixed
//! number of attempts, and optionally closes the connection after each
//! successful request.

pub mod config;
pub mod http;

pub use config::{ConfigError, WrapperConfig};
pub use http::ConnectionWrapper;
