//! Backend TLS client plumbing.
//!
//! Used when a forwarded tunnel terminates TLS itself but the backend
//! target expects an encrypted stream.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use rustls::pki_types::{InvalidDnsNameError, ServerName};
use rustls::{ClientConfig, RootCertStore};
use std::io;
use std::pin::Pin;
use std::sync::{Arc, LazyLock};
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::{debug, warn};

/// Error type for backend TLS connections.
#[derive(Debug, Error)]
pub enum Error {
    /// The target hostname is not usable as an SNI server name.
    #[error("unable to determine server name for SNI")]
    DnsName(#[from] InvalidDnsNameError),
    /// The TLS handshake with the backend failed.
    #[error("TLS handshake with backend failed: {0}")]
    Handshake(#[from] io::Error),
}

/// Process-wide client configuration trusting the system root store.
static CLIENT_CONFIG: LazyLock<Arc<ClientConfig>> = LazyLock::new(|| {
    let mut roots = RootCertStore::empty();
    let loaded = rustls_native_certs::load_native_certs();
    if !loaded.errors.is_empty() {
        warn!(
            "could not access some system certificates: {:?}",
            loaded.errors
        );
    }
    let (added, ignored) = roots.add_parsable_certificates(loaded.certs);
    debug!("loaded {added} system root certificates ({ignored} ignored)");
    Arc::new(
        ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth(),
    )
});

/// Wrap an established TCP stream in a TLS client session, verifying the
/// backend against `server_name`.
pub async fn connect_tls(
    stream: TcpStream,
    server_name: &str,
) -> Result<TlsStream<TcpStream>, Error> {
    handshake(CLIENT_CONFIG.clone(), stream, server_name).await
}

async fn handshake(
    config: Arc<ClientConfig>,
    stream: TcpStream,
    server_name: &str,
) -> Result<TlsStream<TcpStream>, Error> {
    let connector = TlsConnector::from(config);
    let server_name = ServerName::try_from(server_name.to_string())?;
    Ok(connector.connect(server_name, stream).await?)
}

/// A backend stream that may be encrypted with TLS.
// This lint is a false positive because `T` is typically `TcpStream`
// which is not a zero-sized type.
#[allow(clippy::large_enum_variant)]
#[derive(Debug)]
pub enum MaybeTlsStream<T> {
    /// A TLS-encrypted stream
    Tls(TlsStream<T>),
    /// An unencrypted stream
    Plain(T),
}

impl<T: AsyncRead + AsyncWrite + Unpin> AsyncRead for MaybeTlsStream<T> {
    #[inline]
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> AsyncWrite for MaybeTlsStream<T> {
    #[inline]
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    #[inline]
    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    #[inline]
    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

impl<T> From<TlsStream<T>> for MaybeTlsStream<T> {
    fn from(stream: TlsStream<T>) -> Self {
        Self::Tls(stream)
    }
}
