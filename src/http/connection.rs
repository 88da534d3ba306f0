//! Transport seam: opening a connection to one host and running single exchanges on it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::redirect::Policy;
use reqwest::{Client, Identity, Method, StatusCode};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{WrapperConfig, base_url};

/// A fully prepared request, ready to be written to a connection.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRequest {
    pub method: Method,
    /// Request path, already escaped by the wrapper.
    pub path: String,
    pub headers: HeaderMap,
    /// JSON payload, if any.
    pub body: Option<Vec<u8>>,
}

/// Status and full body of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

/// A live session to a single host.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connection: Send {
    /// Sends `request` and reads the whole response.
    /// Any transport-level failure is reported as `Err`.
    async fn send(&mut self, request: &RawRequest) -> Result<RawResponse>;

    /// Tears the session down. Further sends fail.
    fn close(&mut self);
}

/// Creates connections to a host.
#[cfg_attr(test, mockall::automock)]
pub trait Connector: Send + Sync {
    fn connect(&self, host: &str) -> Result<Box<dyn Connection>>;
}

/// Connector backed by a dedicated `reqwest` client per connection.
#[derive(Debug, Clone)]
pub struct ReqwestConnector {
    port: u16,
    https: bool,
    timeout: Duration,
    cert_file: Option<PathBuf>,
    key_file: Option<PathBuf>,
}

impl ReqwestConnector {
    pub fn new(config: &WrapperConfig) -> Self {
        Self {
            port: config.port,
            https: config.https,
            timeout: config.timeout,
            cert_file: config.cert_file.clone(),
            key_file: config.key_file.clone(),
        }
    }

    /// Loads the client identity for mutual TLS, if a certificate is configured.
    /// The key file, when given, is appended to the certificate PEM.
    fn identity(&self) -> Result<Option<Identity>> {
        let Some(cert_file) = &self.cert_file else {
            return Ok(None);
        };

        let mut pem = std::fs::read(cert_file)
            .with_context(|| format!("Failed to read client certificate {:?}", cert_file))?;

        if let Some(key_file) = &self.key_file {
            let key = std::fs::read(key_file)
                .with_context(|| format!("Failed to read client key {:?}", key_file))?;
            pem.push(b'\n');
            pem.extend_from_slice(&key);
        }

        let identity =
            Identity::from_pem(&pem).context("Failed to parse client certificate and key")?;
        Ok(Some(identity))
    }
}

impl Connector for ReqwestConnector {
    #[tracing::instrument(skip(self))]
    fn connect(&self, host: &str) -> Result<Box<dyn Connection>> {
        let base_url = base_url(self.https, host, self.port);
        debug!("Opening connection to {}", base_url);

        let mut builder = Client::builder()
            .http1_only()
            .pool_max_idle_per_host(1)
            .connect_timeout(self.timeout)
            .read_timeout(self.timeout)
            .redirect(Policy::none())
            .no_proxy();

        if self.https {
            if let Some(identity) = self.identity()? {
                builder = builder.identity(identity);
            }
        }

        let client = builder.build().context("Failed to build HTTP client")?;

        Ok(Box::new(ReqwestConnection {
            client: Some(client),
            base_url,
        }))
    }
}

/// One `reqwest` client holding at most one idle keep-alive socket.
pub struct ReqwestConnection {
    client: Option<Client>,
    base_url: String,
}

impl ReqwestConnection {
    fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

#[async_trait]
impl Connection for ReqwestConnection {
    async fn send(&mut self, request: &RawRequest) -> Result<RawResponse> {
        let client = self.client.as_ref().context("Connection is closed")?;
        let url = self.url_for(&request.path);

        let mut builder = client
            .request(request.method.clone(), &url)
            .headers(request.headers.clone());

        if let Some(body) = &request.body {
            if !request.headers.contains_key(CONTENT_TYPE) {
                builder =
                    builder.header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.context("Failed to send request")?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .context("Failed to read response body")?;

        Ok(RawResponse {
            status,
            body: body.to_vec(),
        })
    }

    fn close(&mut self) {
        if self.client.take().is_some() {
            debug!("Closed connection to {}", self.base_url);
        }
    }
}
