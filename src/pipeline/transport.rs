//! HTTP transport
//!
//! The fetcher talks to the network through the [`Transport`] trait so its
//! pacing and retry rules can be exercised without sockets.

use crate::config::ScraperConfig;
use async_trait::async_trait;
use reqwest::Client;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use thiserror::Error;

/// Status and body of one HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// How a request failed before any response arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    /// The connection was closed or reset after it was established
    Disconnect,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Disconnect => "connection",
            Self::Other => "request",
        };
        write!(f, "{}", name)
    }
}

/// A request that produced no response
#[derive(Debug, Clone, Error)]
#[error("{kind} error: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Timeouts and connection failures are worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            TransportErrorKind::Timeout
                | TransportErrorKind::Connect
                | TransportErrorKind::Disconnect
        )
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            TransportErrorKind::Timeout
        } else if e.is_connect() {
            TransportErrorKind::Connect
        } else if is_dropped_connection(&e) {
            TransportErrorKind::Disconnect
        } else {
            TransportErrorKind::Other
        };
        Self::new(kind, e.to_string())
    }
}

/// Whether the connection went away mid-exchange
///
/// reqwest reports a peer that closes or resets an established connection as
/// a request or body error; client-side mistakes (bad URL, redirect loop,
/// undecodable body) are never retried.
fn is_dropped_connection(e: &reqwest::Error) -> bool {
    if e.is_builder() || e.is_redirect() || e.is_decode() || e.is_status() {
        return false;
    }
    if e.is_request() || e.is_body() {
        return true;
    }
    io_error_kind(e).map_or(false, is_disconnect_kind)
}

/// First `io::Error` kind found in the source chain
fn io_error_kind(e: &(dyn StdError + 'static)) -> Option<io::ErrorKind> {
    let mut source = e.source();
    while let Some(err) = source {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            return Some(io_err.kind());
        }
        source = err.source();
    }
    None
}

fn is_disconnect_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

/// Issues a single GET request
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError>;
}

/// Builds the HTTP client used for list pages and covers
///
/// # Arguments
///
/// * `config` - Supplies the user agent and the per-request timeout
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &ScraperConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.network.user_agent.clone())
        .timeout(config.request_timeout())
        .connect_timeout(config.request_timeout())
        .gzip(true)
        .brotli(true)
        .build()
}

/// [`Transport`] backed by a reqwest client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &ScraperConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();

        tracing::trace!("GET {} -> {} ({} bytes)", url, status, body.len());
        Ok(RawResponse { status, body })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Transport that replays canned responses per URL
    ///
    /// Each URL has a queue; the last entry repeats once the queue is down to
    /// one item. Unknown URLs answer 404.
    #[derive(Default)]
    pub struct ScriptedTransport {
        responses: Mutex<HashMap<String, VecDeque<Result<RawResponse, TransportError>>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(self, url: &str, status: u16, body: &[u8]) -> Self {
            self.push(
                url,
                Ok(RawResponse {
                    status,
                    body: body.to_vec(),
                }),
            )
        }

        pub fn fail(self, url: &str, kind: TransportErrorKind) -> Self {
            self.push(url, Err(TransportError::new(kind, "scripted failure")))
        }

        fn push(self, url: &str, entry: Result<RawResponse, TransportError>) -> Self {
            self.responses
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default()
                .push_back(entry);
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self, url: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| *c == url).count()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn get(&self, url: &str) -> Result<RawResponse, TransportError> {
            self.calls.lock().unwrap().push(url.to_string());

            let mut responses = self.responses.lock().unwrap();
            match responses.get_mut(url) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
                Some(queue) if !queue.is_empty() => queue[0].clone(),
                _ => Ok(RawResponse {
                    status: 404,
                    body: Vec::new(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client() {
        let config = ScraperConfig::default();
        assert!(build_http_client(&config).is_ok());
        assert!(HttpTransport::new(&config).is_ok());
    }

    #[test]
    fn test_transient_kinds() {
        assert!(TransportError::new(TransportErrorKind::Timeout, "slow").is_transient());
        assert!(TransportError::new(TransportErrorKind::Connect, "refused").is_transient());
        assert!(TransportError::new(TransportErrorKind::Disconnect, "reset").is_transient());
        assert!(!TransportError::new(TransportErrorKind::Other, "bad").is_transient());
    }

    #[test]
    fn test_disconnect_io_kinds() {
        assert!(is_disconnect_kind(io::ErrorKind::ConnectionReset));
        assert!(is_disconnect_kind(io::ErrorKind::UnexpectedEof));
        assert!(!is_disconnect_kind(io::ErrorKind::PermissionDenied));
    }

    #[test]
    fn test_io_error_kind_walks_sources() {
        #[derive(Debug, Error)]
        #[error("outer")]
        struct Outer(#[source] io::Error);

        let err = Outer(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer"));
        assert_eq!(io_error_kind(&err), Some(io::ErrorKind::ConnectionReset));

        let plain = io::Error::new(io::ErrorKind::Other, "no source");
        assert_eq!(io_error_kind(&plain), None);
    }

    #[tokio::test]
    async fn test_dropped_connection_is_transient() {
        use tokio::io::AsyncReadExt;
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
        });

        let transport = HttpTransport::new(&ScraperConfig::default()).unwrap();
        let err = transport
            .get(&format!("http://{}/list/show/1?page=1", addr))
            .await
            .unwrap_err();

        assert_eq!(err.kind, TransportErrorKind::Disconnect);
        assert!(err.is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = TransportError::new(TransportErrorKind::Timeout, "after 30s");
        assert_eq!(err.to_string(), "timeout error: after 30s");
    }

    #[test]
    fn test_success_range() {
        let ok = RawResponse { status: 204, body: Vec::new() };
        let not_found = RawResponse { status: 404, body: Vec::new() };
        assert!(ok.is_success());
        assert!(!not_found.is_success());
    }

    #[tokio::test]
    async fn test_scripted_transport_replays() {
        let transport = testing::ScriptedTransport::new()
            .respond("http://x/a", 429, b"")
            .respond("http://x/a", 200, b"ok");

        assert_eq!(transport.get("http://x/a").await.unwrap().status, 429);
        assert_eq!(transport.get("http://x/a").await.unwrap().status, 200);
        assert_eq!(transport.get("http://x/a").await.unwrap().status, 200);
        assert_eq!(transport.get("http://x/b").await.unwrap().status, 404);
        assert_eq!(transport.call_count("http://x/a"), 3);
    }
}
