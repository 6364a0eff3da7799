//! HTTP transport used to reach the gateway.
//!
//! The client only needs "post these bytes, get status, content type and
//! body back". [`Transport`] is that seam; [`HttpTransport`] is the
//! hyper-based implementation used by default.

use crate::config::TlsClientConfig;
use crate::stream::GatewayStream;
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{CONTENT_TYPE, HOST};
use hyper::{Method, Request, Uri};
use hyper_util::rt::TokioIo;
use std::time::Duration;
use thiserror::Error;

/// Content type of request and successful reply bodies.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request timeout")]
    Timeout,

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("TLS handshake failed: {0}")]
    TlsHandshake(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// An outgoing POST.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    /// Deadline for the whole exchange.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A reply as seen by the client.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl HttpReply {
    pub fn new(status: u16, content_type: Option<&str>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: content_type.map(str::to_string),
            body: body.into(),
        }
    }

    /// A 200 reply carrying a marshalled body.
    pub fn octet_stream(body: impl Into<Bytes>) -> Self {
        Self::new(200, Some(OCTET_STREAM), body)
    }

    /// Returns whether the reply carries a decodable body.
    pub fn is_success(&self) -> bool {
        self.status == 200
            && self
                .content_type
                .as_deref()
                .is_some_and(|ct| ct.starts_with(OCTET_STREAM))
    }

    /// Body as text, for error reporting.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends one request and waits for its reply.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpReply, TransportError>;
}

/// HTTP/1.1 transport over plain TCP or TLS; one connection per request.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    tls: TlsClientConfig,
}

impl HttpTransport {
    pub fn new(tls: TlsClientConfig) -> Self {
        Self { tls }
    }

    async fn round_trip(&self, uri: Uri, request: HttpRequest) -> Result<HttpReply, TransportError> {
        let stream = GatewayStream::open(&uri, &self.tls).await?;
        let (mut sender, connection) =
            hyper::client::conn::http1::handshake::<_, Full<Bytes>>(TokioIo::new(stream))
                .await
                .map_err(|e| TransportError::Http(e.to_string()))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!("Gateway connection closed: {}", e);
            }
        });

        let authority = uri
            .authority()
            .map(|a| a.as_str().to_string())
            .unwrap_or_default();
        let path = uri.path_and_query().map_or("/", |p| p.as_str());

        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(HOST, authority);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let http_request = builder
            .body(Full::new(request.body))
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let response = sender
            .send_request(http_request)
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?
            .to_bytes();

        tracing::debug!("Gateway replied {} with {} bytes", status, body.len());
        Ok(HttpReply {
            status,
            content_type,
            body,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpReply, TransportError> {
        let uri: Uri = request
            .url
            .parse()
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", request.url, e)))?;

        match request.timeout {
            Some(deadline) => tokio::time::timeout(deadline, self.round_trip(uri, request))
                .await
                .map_err(|_| {
                    tracing::debug!("Gateway request timeout");
                    TransportError::Timeout
                })?,
            None => self.round_trip(uri, request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn request(url: String) -> HttpRequest {
        HttpRequest {
            url,
            headers: vec![
                ("Content-Type".to_string(), OCTET_STREAM.to_string()),
                ("Os-User".to_string(), String::new()),
            ],
            body: Bytes::from_static(b"\x1b\x1a"),
            timeout: Some(Duration::from_secs(5)),
        }
    }

    #[test]
    fn test_header_lookup() {
        let req = request("http://ifs.com/".to_string());
        assert_eq!(req.header("content-type"), Some(OCTET_STREAM));
        assert_eq!(req.header("os-user"), Some(""));
        assert_eq!(req.header("Authorization"), None);
    }

    #[test]
    fn test_reply_success() {
        assert!(HttpReply::octet_stream(Bytes::new()).is_success());
        assert!(!HttpReply::new(404, Some(OCTET_STREAM), "nope").is_success());
        assert!(!HttpReply::new(200, Some("text/html"), "nope").is_success());
        assert!(!HttpReply::new(200, None, "nope").is_success());
        assert_eq!(HttpReply::new(404, None, "Not found").text(), "Not found");
    }

    #[tokio::test]
    async fn test_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                received.extend_from_slice(&buf[..n]);
                if n == 0 || received.ends_with(b"\x1b\x1a") {
                    break;
                }
            }
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: 2\r\n\r\n\x1b\x1a",
                )
                .await
                .unwrap();
            String::from_utf8_lossy(&received).into_owned()
        });

        let url = format!("http://127.0.0.1:{}/main/compatibility/plsqlgateway/AccessPlsql/Invoke", addr.port());
        let reply = HttpTransport::default().send(request(url)).await.unwrap();
        assert!(reply.is_success());
        assert_eq!(&reply.body[..], b"\x1b\x1a");

        let received = server.await.unwrap();
        assert!(received.starts_with("POST /main/compatibility/plsqlgateway/AccessPlsql/Invoke HTTP/1.1"));
        assert!(received.to_lowercase().contains("content-type: application/octet-stream"));
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let err = HttpTransport::default()
            .send(request("http://bad host/".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidUrl(_)));
    }
}
