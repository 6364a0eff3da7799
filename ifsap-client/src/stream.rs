//! Gateway stream abstraction for TLS and plain TCP.

use crate::config::TlsClientConfig;
use crate::tls;
use crate::transport::TransportError;
use hyper::Uri;
use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream as ClientTlsStream;

pin_project! {
    /// A gateway connection that can be either plain TCP or TLS.
    #[project = GatewayStreamProj]
    pub enum GatewayStream {
        Plain { #[pin] stream: TcpStream },
        Tls { #[pin] stream: ClientTlsStream<TcpStream> },
    }
}

impl GatewayStream {
    /// Opens a connection to the host of `uri`, upgrading to TLS for `https`.
    pub async fn open(uri: &Uri, tls_config: &TlsClientConfig) -> Result<Self, TransportError> {
        let host = uri
            .host()
            .ok_or_else(|| TransportError::InvalidUrl(format!("missing host in {}", uri)))?;
        let secure = match uri.scheme_str() {
            Some("https") => true,
            Some("http") | None => false,
            Some(other) => {
                return Err(TransportError::InvalidUrl(format!(
                    "unsupported scheme: {}",
                    other
                )))
            }
        };
        let port = uri.port_u16().unwrap_or(if secure { 443 } else { 80 });

        tracing::debug!("Connecting to {}:{}...", host, port);
        let tcp = TcpStream::connect((host, port)).await.map_err(|e| {
            tracing::debug!("Connection failed: {}", e);
            TransportError::Io(e)
        })?;
        tcp.set_nodelay(true)?;

        if !secure {
            return Ok(GatewayStream::Plain { stream: tcp });
        }

        let (connector, server_name) = tls::connector(tls_config, host)?;
        let stream = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| TransportError::TlsHandshake(e.to_string()))?;
        Ok(GatewayStream::Tls { stream })
    }

    /// Returns whether this stream is TLS-encrypted.
    pub fn is_tls(&self) -> bool {
        matches!(self, GatewayStream::Tls { .. })
    }
}

impl AsyncRead for GatewayStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.project() {
            GatewayStreamProj::Plain { stream } => stream.poll_read(cx, buf),
            GatewayStreamProj::Tls { stream } => stream.poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for GatewayStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.project() {
            GatewayStreamProj::Plain { stream } => stream.poll_write(cx, buf),
            GatewayStreamProj::Tls { stream } => stream.poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            GatewayStreamProj::Plain { stream } => stream.poll_flush(cx),
            GatewayStreamProj::Tls { stream } => stream.poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            GatewayStreamProj::Plain { stream } => stream.poll_shutdown(cx),
            GatewayStreamProj::Tls { stream } => stream.poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_open_plain() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).await.unwrap();
            buf
        });

        let uri: Uri = format!("http://127.0.0.1:{}/", addr.port()).parse().unwrap();
        let mut stream = GatewayStream::open(&uri, &TlsClientConfig::default()).await.unwrap();
        assert!(!stream.is_tls());
        stream.write_all(b"ping").await.unwrap();
        assert_eq!(&server.await.unwrap(), b"ping");
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let uri: Uri = "ftp://127.0.0.1/".parse().unwrap();
        let err = GatewayStream::open(&uri, &TlsClientConfig::default()).await.err().unwrap();
        assert!(matches!(err, TransportError::InvalidUrl(_)));
    }
}
