//! Byte-stream transport capability.
//!
//! Both protocol engines drive a [`Transport`]: an already-framed-nothing
//! byte stream with connect, read, write, availability probe, and shutdown.
//! [`TlsTransport`] is the default implementation over a TCP socket with
//! optional rustls encryption, supporting both implicit TLS and a
//! STARTTLS-style in-place upgrade.

#![allow(clippy::missing_errors_doc)]

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use crate::{Error, Result};

/// A connectable byte stream consumed by the protocol engines.
///
/// Implementations own the socket; the engine owns the framing, parsing, and
/// protocol state. Engines call `read`/`write` as their only suspension
/// points and treat a failed call as a hard error for the operation in
/// progress.
pub trait Transport: Send {
    /// Establishes a connection to `host:port`, with implicit TLS if `tls`.
    fn connect(
        &mut self,
        host: &str,
        port: u16,
        tls: bool,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Upgrades an established plaintext connection to TLS (STARTTLS).
    fn upgrade_tls(&mut self, host: &str) -> impl Future<Output = Result<()>> + Send;

    /// Reads up to `buf.len()` bytes, returning the count read.
    ///
    /// Returns `Ok(0)` only on a closed peer.
    fn read(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<usize>> + Send;

    /// Writes the whole of `data`, returning the count written.
    fn write(&mut self, data: &[u8]) -> impl Future<Output = Result<usize>> + Send;

    /// Returns the number of bytes that can be read without blocking.
    fn available(&mut self) -> impl Future<Output = Result<usize>> + Send;

    /// Shuts the connection down. Safe to call when already closed.
    fn stop(&mut self) -> impl Future<Output = ()> + Send;

    /// Returns true while the connection is believed established.
    fn is_connected(&self) -> bool;
}

enum Inner {
    Closed,
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

/// Default [`Transport`] over TCP with optional rustls TLS.
pub struct TlsTransport {
    inner: Inner,
    /// Bytes pulled off the socket by `available()` but not yet consumed.
    peeked: BytesMut,
}

impl TlsTransport {
    /// Creates a disconnected transport.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Inner::Closed,
            peeked: BytesMut::new(),
        }
    }

    async fn read_inner(&mut self, buf: &mut [u8]) -> Result<usize> {
        match &mut self.inner {
            Inner::Closed => Err(Error::NotConnected),
            Inner::Plain(stream) => Ok(stream.read(buf).await?),
            Inner::Tls(stream) => Ok(stream.read(buf).await?),
        }
    }
}

impl Default for TlsTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for TlsTransport {
    async fn connect(&mut self, host: &str, port: u16, tls: bool) -> Result<()> {
        let addr = format!("{host}:{port}");
        let tcp = TcpStream::connect(&addr)
            .await
            .map_err(|e| Error::ConnectionFailed(format!("{addr}: {e}")))?;
        debug!(host, port, tls, "transport connected");

        self.peeked.clear();
        if tls {
            let connector = create_tls_connector();
            let server_name = ServerName::try_from(host.to_string())?;
            let stream = connector.connect(server_name, tcp).await?;
            self.inner = Inner::Tls(Box::new(stream));
        } else {
            self.inner = Inner::Plain(tcp);
        }
        Ok(())
    }

    async fn upgrade_tls(&mut self, host: &str) -> Result<()> {
        match std::mem::replace(&mut self.inner, Inner::Closed) {
            Inner::Plain(tcp) => {
                let connector = create_tls_connector();
                let server_name = ServerName::try_from(host.to_string())?;
                let stream = connector.connect(server_name, tcp).await?;
                self.inner = Inner::Tls(Box::new(stream));
                debug!(host, "transport upgraded to TLS");
                Ok(())
            }
            Inner::Tls(stream) => {
                self.inner = Inner::Tls(stream);
                Err(Error::ConnectionFailed("stream is already TLS".into()))
            }
            Inner::Closed => Err(Error::NotConnected),
        }
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.peeked.is_empty() {
            let n = self.peeked.len().min(buf.len());
            buf[..n].copy_from_slice(&self.peeked.split_to(n));
            return Ok(n);
        }
        self.read_inner(buf).await
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize> {
        match &mut self.inner {
            Inner::Closed => Err(Error::NotConnected),
            Inner::Plain(stream) => {
                stream.write_all(data).await?;
                stream.flush().await?;
                Ok(data.len())
            }
            Inner::Tls(stream) => {
                stream.write_all(data).await?;
                stream.flush().await?;
                Ok(data.len())
            }
        }
    }

    async fn available(&mut self) -> Result<usize> {
        if matches!(self.inner, Inner::Closed) {
            return Err(Error::NotConnected);
        }
        if self.peeked.is_empty() {
            let mut probe = [0u8; 512];
            // A zero-length timeout turns the blocking read into a poll.
            match tokio::time::timeout(Duration::ZERO, self.read_inner(&mut probe)).await {
                Ok(Ok(0)) => return Err(Error::ConnectionClosed),
                Ok(Ok(n)) => self.peeked.extend_from_slice(&probe[..n]),
                Ok(Err(e)) => return Err(e),
                Err(_) => {}
            }
        }
        Ok(self.peeked.len())
    }

    async fn stop(&mut self) {
        match std::mem::replace(&mut self.inner, Inner::Closed) {
            Inner::Closed => {}
            Inner::Plain(mut stream) => {
                let _ = stream.shutdown().await;
            }
            Inner::Tls(mut stream) => {
                let _ = stream.shutdown().await;
            }
        }
        self.peeked.clear();
    }

    fn is_connected(&self) -> bool {
        !matches!(self.inner, Inner::Closed)
    }
}

/// Adapter exposing an already-established stream as a [`Transport`].
///
/// This is the substitution point for callers that do their own connection
/// establishment or TLS upgrade: hand the finished stream to the engine and
/// it never calls `connect` itself. Reconnecting is not possible through
/// this adapter; a dropped stream is terminal.
pub struct StreamTransport<S> {
    stream: Option<S>,
    peeked: BytesMut,
}

impl<S> StreamTransport<S> {
    /// Wraps an established stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream: Some(stream),
            peeked: BytesMut::new(),
        }
    }
}

impl<S> Transport for StreamTransport<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    async fn connect(&mut self, _host: &str, _port: u16, _tls: bool) -> Result<()> {
        Err(Error::ConnectionFailed(
            "pre-established stream cannot reconnect".into(),
        ))
    }

    async fn upgrade_tls(&mut self, _host: &str) -> Result<()> {
        Err(Error::ConnectionFailed(
            "pre-established stream cannot be upgraded here".into(),
        ))
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.peeked.is_empty() {
            let n = self.peeked.len().min(buf.len());
            buf[..n].copy_from_slice(&self.peeked.split_to(n));
            return Ok(n);
        }
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        Ok(stream.read(buf).await?)
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(data.len())
    }

    async fn available(&mut self) -> Result<usize> {
        if self.peeked.is_empty() {
            let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
            let mut probe = [0u8; 512];
            match tokio::time::timeout(Duration::ZERO, stream.read(&mut probe)).await {
                Ok(Ok(0)) => return Err(Error::ConnectionClosed),
                Ok(Ok(n)) => self.peeked.extend_from_slice(&probe[..n]),
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {}
            }
        }
        Ok(self.peeked.len())
    }

    async fn stop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.peeked.clear();
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

/// Creates a TLS connector with the bundled root certificates.
#[must_use]
pub fn create_tls_connector() -> TlsConnector {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

/// In-memory [`Transport`] serving a scripted sequence of reads.
///
/// Intended for protocol tests: queue the server's responses, run the
/// engine, then inspect everything it wrote. A drained script reads as a
/// closed peer.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    reads: std::collections::VecDeque<Vec<u8>>,
    written: Vec<u8>,
    connected: bool,
}

impl ScriptedTransport {
    /// Creates a connected transport with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reads: std::collections::VecDeque::new(),
            written: Vec::new(),
            connected: true,
        }
    }

    /// Queues bytes the next reads will return.
    pub fn push_read(&mut self, data: impl AsRef<[u8]>) {
        self.reads.push_back(data.as_ref().to_vec());
    }

    /// Everything the engine wrote so far.
    #[must_use]
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Written bytes as lossy UTF-8, for convenient assertions.
    #[must_use]
    pub fn written_text(&self) -> String {
        String::from_utf8_lossy(&self.written).into_owned()
    }
}

impl Transport for ScriptedTransport {
    async fn connect(&mut self, _host: &str, _port: u16, _tls: bool) -> Result<()> {
        self.connected = true;
        Ok(())
    }

    async fn upgrade_tls(&mut self, _host: &str) -> Result<()> {
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        while self.reads.front().is_some_and(Vec::is_empty) {
            self.reads.pop_front();
        }
        let Some(front) = self.reads.front_mut() else {
            return Ok(0);
        };
        let n = front.len().min(buf.len());
        buf[..n].copy_from_slice(&front[..n]);
        front.drain(..n);
        if front.is_empty() {
            self.reads.pop_front();
        }
        Ok(n)
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        self.written.extend_from_slice(data);
        Ok(data.len())
    }

    async fn available(&mut self) -> Result<usize> {
        Ok(self.reads.front().map_or(0, Vec::len))
    }

    async fn stop(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_transport_is_disconnected() {
        let transport = TlsTransport::new();
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_read_without_connection_fails() {
        let mut transport = TlsTransport::new();
        let mut buf = [0u8; 16];
        assert!(matches!(
            transport.read(&mut buf).await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_stop_when_closed_is_noop() {
        let mut transport = TlsTransport::new();
        transport.stop().await;
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_plain_round_trip() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            sock.read_exact(&mut buf).await.unwrap();
            sock.write_all(b"pong").await.unwrap();
        });

        let mut transport = TlsTransport::new();
        transport
            .connect("127.0.0.1", addr.port(), false)
            .await
            .unwrap();
        assert!(transport.is_connected());

        transport.write(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        let mut read = 0;
        while read < 4 {
            read += transport.read(&mut buf[read..]).await.unwrap();
        }
        assert_eq!(&buf, b"pong");

        transport.stop().await;
        assert!(!transport.is_connected());
        server.await.unwrap();
    }
}
