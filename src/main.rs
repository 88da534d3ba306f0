use anyhow::{Result, bail};
use clap::Parser;
use connwrap::config::{DEFAULT_MAX_ATTEMPTS, DEFAULT_PORT, WrapperConfig};
use connwrap::http::ConnectionWrapper;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

/// connwrap - send one request through a reconnecting HTTP connection
///
/// The raw response body is written to stdout, whatever its status.
/// The command fails only when no response could be obtained at all.
///
/// Examples:
///   connwrap api.example.com GET /v1/items
///   connwrap https://api.example.com POST /v1/items --data '{"name": "x"}'
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Target host; a leading http:// or https:// is ignored
    #[arg(value_name = "HOST")]
    host: String,

    /// HTTP method, e.g. GET or POST
    #[arg(value_name = "METHOD", value_parser = parse_method)]
    method: Method,

    /// Request path; '#' is sent as %23
    #[arg(value_name = "PATH")]
    path: String,

    /// TCP port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Use plain HTTP instead of TLS
    #[arg(long = "plain-http")]
    plain_http: bool,

    /// Per socket operation timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = 120)]
    timeout: u64,

    /// Keep the connection open after a successful response
    #[arg(long = "keep-open")]
    keep_open: bool,

    /// Attempts before giving up on transport failures
    #[arg(long = "max-attempts", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    max_attempts: u32,

    /// Client certificate for mutual TLS (also via USERCRT)
    #[arg(long = "cert-file", env = "USERCRT", value_name = "PATH")]
    cert_file: Option<PathBuf>,

    /// Client key for mutual TLS (also via USERKEY)
    #[arg(long = "key-file", env = "USERKEY", value_name = "PATH")]
    key_file: Option<PathBuf>,

    /// JSON request body
    #[arg(long, value_name = "JSON", value_parser = parse_json)]
    data: Option<serde_json::Value>,

    /// Extra header as "Name: value"; may be repeated
    #[arg(short = 'H', long = "header", value_name = "HEADER", value_parser = parse_header)]
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl Cli {
    fn wrapper_config(&self) -> WrapperConfig {
        WrapperConfig::new(&self.host)
            .port(self.port)
            .https(!self.plain_http)
            .timeout(Duration::from_secs(self.timeout))
            .keep_open(self.keep_open)
            .max_attempts(self.max_attempts)
            .cert_file(self.cert_file.clone())
            .key_file(self.key_file.clone())
    }

    fn header_map(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            headers.append(name.clone(), value.clone());
        }
        headers
    }
}

fn parse_method(s: &str) -> Result<Method, String> {
    Method::from_bytes(s.to_ascii_uppercase().as_bytes())
        .map_err(|_| format!("invalid HTTP method: {}", s))
}

fn parse_json(s: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(s).map_err(|e| format!("invalid JSON: {}", e))
}

fn parse_header(s: &str) -> Result<(HeaderName, HeaderValue), String> {
    let (name, value) = s
        .split_once(':')
        .ok_or_else(|| format!("expected \"Name: value\", got {:?}", s))?;
    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .map_err(|e| format!("invalid header name {:?}: {}", name.trim(), e))?;
    let value = HeaderValue::from_str(value.trim())
        .map_err(|e| format!("invalid header value for {}: {}", name, e))?;
    Ok((name, value))
}

async fn run(cli: Cli) -> Result<()> {
    let mut wrapper = ConnectionWrapper::new(cli.wrapper_config())?;
    let headers = cli.header_map();

    let body = wrapper
        .request(cli.method.clone(), &cli.path, cli.data.as_ref(), Some(&headers))
        .await;
    wrapper.close();

    let Some(body) = body else {
        bail!(
            "Request to {} could not be completed after {} attempts",
            wrapper.host(),
            wrapper.max_attempts()
        );
    };

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&body)?;
    stdout.flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    run(cli).await
}
