//! Single-host connection wrapper with lazy connect and bounded reconnect-and-retry.

use anyhow::{Context, Result};
use log::{debug, error};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use std::time::Instant;

use super::connection::{Connection, Connector, RawRequest, RawResponse, ReqwestConnector};
use crate::config::{ConfigError, WrapperConfig};

/// Keeps at most one open connection to a host and issues requests over it.
///
/// Only transport failures are retried, each time on a fresh connection. Any
/// HTTP response, whatever its status, ends the call. Methods take `&mut self`,
/// so concurrent callers need one wrapper each or an external lock.
pub struct ConnectionWrapper<C: Connector = ReqwestConnector> {
    host: String,
    keep_open: bool,
    max_attempts: u32,
    connector: C,
    connection: Option<Box<dyn Connection>>,
}

impl ConnectionWrapper<ReqwestConnector> {
    /// Creates a wrapper backed by `reqwest`. No connection is opened yet.
    pub fn new(config: WrapperConfig) -> Result<Self, ConfigError> {
        let connector = ReqwestConnector::new(&config);
        Self::with_connector(config, connector)
    }
}

impl<C: Connector> ConnectionWrapper<C> {
    /// Creates a wrapper that opens its connections through `connector`.
    pub fn with_connector(config: WrapperConfig, connector: C) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            host: config.host,
            keep_open: config.keep_open,
            max_attempts: config.max_attempts,
            connector,
            connection: None,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether a connection handle is currently held.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Drops the current handle without closing it and opens a new one.
    /// On failure no handle is held afterwards.
    pub fn refresh(&mut self) -> Result<()> {
        debug!("Refreshing connection");
        self.connection = None;
        let connection = self
            .connector
            .connect(&self.host)
            .with_context(|| format!("Failed to connect to {}", self.host))?;
        self.connection = Some(connection);
        Ok(())
    }

    /// Closes the open connection, if any.
    pub fn close(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            debug!("Closing connection for {}", self.host);
            connection.close();
        }
    }

    /// Sends a request and returns the raw response body.
    ///
    /// Returns the body for any HTTP response, 200 or not. Returns `None` only
    /// when every attempt failed at the transport level.
    #[tracing::instrument(skip(self, body, headers))]
    pub async fn request(
        &mut self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        headers: Option<&HeaderMap>,
    ) -> Option<Vec<u8>> {
        let request = RawRequest {
            method,
            path: escape_path(path),
            headers: merge_headers(headers),
            body: body.map(|value| value.to_string().into_bytes()),
        };

        for attempt in 1..=self.max_attempts {
            if attempt != 1 {
                debug!("Connection attempt number {}", attempt);
            }

            let start = Instant::now();
            match self.exchange(&request).await {
                Ok(response) if response.status == StatusCode::OK => {
                    if !self.keep_open {
                        self.close();
                    }
                    debug!(
                        "{} request to {}{} took {:.2}s",
                        request.method,
                        self.host,
                        request.path,
                        start.elapsed().as_secs_f64()
                    );
                    return Some(response.body);
                }
                Ok(response) => {
                    error!(
                        "Error {} while doing a {} to {}: {}",
                        response.status.as_u16(),
                        request.method,
                        request.path,
                        String::from_utf8_lossy(&response.body)
                    );
                    return Some(response.body);
                }
                Err(e) => {
                    error!(
                        "Exception while doing a {} to {}: {:#}",
                        request.method, request.path, e
                    );
                    // Most likely the connection was terminated; the next attempt reconnects.
                    self.connection = None;
                }
            }
        }

        error!(
            "Connection wrapper failed after {} attempts",
            self.max_attempts
        );
        None
    }

    /// Same as [`request`](Self::request).
    pub async fn api(
        &mut self,
        method: Method,
        url: &str,
        data: Option<&serde_json::Value>,
        headers: Option<&HeaderMap>,
    ) -> Option<Vec<u8>> {
        self.request(method, url, data, headers).await
    }

    /// One attempt: connect if needed, then send on the held connection.
    async fn exchange(&mut self, request: &RawRequest) -> Result<RawResponse> {
        if self.connection.is_none() {
            self.refresh()?;
        }
        let connection = self
            .connection
            .as_mut()
            .context("No connection available")?;
        connection.send(request).await
    }
}

/// Escapes `#` as `%23`. Nothing else is touched.
pub(crate) fn escape_path(path: &str) -> String {
    path.replace('#', "%23")
}

/// `Accept: application/json` plus `extra`, where `extra` wins on name clashes.
pub(crate) fn merge_headers(extra: Option<&HeaderMap>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    if let Some(extra) = extra {
        for name in extra.keys() {
            headers.remove(name);
            for value in extra.get_all(name) {
                headers.append(name.clone(), value.clone());
            }
        }
    }

    headers
}
