//! Single-host HTTP connection handling with reconnect-and-retry.

mod connection;
mod wrapper;

pub use connection::{
    Connection, Connector, RawRequest, RawResponse, ReqwestConnection, ReqwestConnector,
};
pub use wrapper::ConnectionWrapper;
