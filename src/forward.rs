//! Tunnel-to-backend connection forwarding.
//!
//! One accept loop runs per tunnel. Every inbound connection gets its own
//! task that resolves the backend address, dials it, optionally wraps the
//! backend in TLS, and splices bytes until either side closes. Failures on
//! a single connection are logged and never take down the tunnel; only a
//! fatal accept error or cancellation ends the forwarding task.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use crate::conn::Conn;
use crate::session::{Session, Tunnel};
use crate::tls::MaybeTlsStream;
use http::Uri;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Default deadline for [`Forwarder::close`].
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Terminal result of a forwarding task.
///
/// Per-connection failures never surface here; they are logged and the
/// accept loop keeps going.
#[derive(Debug, Error)]
pub enum Error {
    /// The tunnel's accept operation failed and the tunnel is no longer
    /// usable. Always wraps the taxonomy's accept category.
    #[error(transparent)]
    Accept(#[from] crate::Error),
    /// The governing cancellation token was triggered.
    #[error("forwarding canceled")]
    Canceled,
    /// The forwarding task could not be joined.
    #[error("forwarding task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Why a single connection could not be forwarded to the backend.
#[derive(Debug, Error)]
enum BackendError {
    /// The target URL has no port and the scheme has no default.
    #[error("no default tcp port available for \"{0}\"")]
    NoDefaultPort(String),
    /// The target URL has no host.
    #[error("missing host in backend url")]
    MissingHost,
    /// The TCP dial failed.
    #[error(transparent)]
    Connect(io::Error),
    /// Cancellation fired while the dial was in flight.
    #[error("backend dial canceled")]
    Canceled,
    /// The TLS handshake with the backend failed.
    #[error(transparent)]
    Tls(crate::tls::Error),
}

/// Start forwarding every connection accepted on `tunnel` to `to_url`.
///
/// Canceling `cancel` stops new accepts and new backend dials in bounded
/// time, but connections that are already spliced drain on their own; there
/// is no forced timeout on an established splice.
pub fn forward<T: Tunnel>(tunnel: T, to_url: Uri, cancel: CancellationToken) -> Forwarder<T> {
    let tunnel = Arc::new(tunnel);
    let tracker = TaskTracker::new();
    let task = tokio::spawn(run_accept_loop(
        tunnel.clone(),
        to_url.clone(),
        cancel.clone(),
        tracker,
    ));
    Forwarder {
        tunnel,
        to_url,
        cancel,
        task,
    }
}

/// Handle to one tunnel's forwarding task.
pub struct Forwarder<T: Tunnel> {
    tunnel: Arc<T>,
    to_url: Uri,
    cancel: CancellationToken,
    task: JoinHandle<Result<(), Error>>,
}

impl<T: Tunnel> Forwarder<T> {
    /// Block until the accept loop exits and every spawned connection task
    /// has drained, returning the accept loop's terminal error.
    pub async fn wait(self) -> Result<(), Error> {
        self.task.await?
    }

    /// Close the underlying tunnel, bounded by a 5-second deadline.
    pub async fn close(&self) -> io::Result<()> {
        self.close_with_timeout(CLOSE_TIMEOUT).await
    }

    /// Close the underlying tunnel. Closing involves sending a close
    /// message over the parent session, hence the explicit deadline.
    pub async fn close_with_timeout(&self, timeout: Duration) -> io::Result<()> {
        match tokio::time::timeout(timeout, self.tunnel.close()).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "tunnel close timed out",
            )),
        }
    }

    /// Trigger the governing cancellation token. Equivalent to canceling
    /// the token passed to [`forward`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The public URL of the forwarded tunnel.
    #[must_use]
    pub fn url(&self) -> String {
        self.tunnel.url()
    }

    /// The tunnel's forwarding description.
    #[must_use]
    pub fn forwards_to(&self) -> String {
        self.tunnel.forwards_to()
    }

    /// The backend URL connections are forwarded to.
    #[must_use]
    pub fn to_url(&self) -> &Uri {
        &self.to_url
    }

    /// The session the forwarded tunnel was started on.
    #[must_use]
    pub fn session(&self) -> &T::Session {
        self.tunnel.session()
    }
}

impl<T: Tunnel> fmt::Debug for Forwarder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Forwarder")
            .field("url", &self.tunnel.url())
            .field("to_url", &self.to_url)
            .finish_non_exhaustive()
    }
}

#[tracing::instrument(
    skip_all,
    level = "debug",
    fields(
        session = %tunnel.session().id(),
        tunnel_url = %tunnel.url(),
        to_url = %to_url,
    )
)]
async fn run_accept_loop<T: Tunnel>(
    tunnel: Arc<T>,
    to_url: Uri,
    cancel: CancellationToken,
    tracker: TaskTracker,
) -> Result<(), Error> {
    let result = accept_loop(tunnel.as_ref(), &to_url, &cancel, &tracker).await;
    // Let already-spawned connection tasks drain before reporting.
    tracker.close();
    tracker.wait().await;
    debug!("forwarding task finished");
    result
}

async fn accept_loop<T: Tunnel>(
    tunnel: &T,
    to_url: &Uri,
    cancel: &CancellationToken,
    tracker: &TaskTracker,
) -> Result<(), Error> {
    loop {
        let conn = tokio::select! {
            () = cancel.cancelled() => return Err(Error::Canceled),
            result = tunnel.accept() => result.map_err(crate::Error::accept)?,
        };
        debug!(proto = %conn.proto(), edge = %conn.edge_type(), "accepted connection");
        tracker.spawn(forward_conn(conn, to_url.clone(), cancel.clone()));
    }
}

/// Forward one inbound connection to the backend.
///
/// Nothing escapes this task: a failure to reach the backend is reported
/// to the peer where the protocol allows it and otherwise only logged.
#[tracing::instrument(skip_all, level = "debug", fields(proto = %conn.proto()))]
async fn forward_conn<C: Conn>(mut conn: C, to_url: Uri, cancel: CancellationToken) {
    let mut backend = match open_backend(&conn, &to_url, &cancel).await {
        Ok(backend) => backend,
        Err(e) => {
            warn!("failed to connect to backend url: {e}");
            // A TLS failure happens after the dial, once the peer may
            // already have seen traffic, so only dial-stage failures get
            // the canned response.
            let report = !matches!(e, BackendError::Tls(_));
            if report && matches!(conn.proto().to_lowercase().as_str(), "http" | "https") {
                if let Err(e) = write_http_error(&mut conn, &e).await {
                    debug!("failed to write 502 response: {e}");
                }
            }
            let _ = conn.shutdown().await;
            return;
        }
    };
    // Best-effort splice: a reset on either side simply ends the copy.
    let _ = tokio::io::copy_bidirectional(&mut conn, &mut backend).await;
    let _ = conn.shutdown().await;
    let _ = backend.shutdown().await;
    debug!("connection finished");
}

/// Resolve the backend address and open a (possibly TLS-wrapped) stream
/// to it, bounded by the governing cancellation token.
async fn open_backend<C: Conn>(
    conn: &C,
    to_url: &Uri,
    cancel: &CancellationToken,
) -> Result<MaybeTlsStream<TcpStream>, BackendError> {
    let (host, port) = backend_address(to_url)?;
    debug!("dial backend tcp {host}:{port}");
    let stream = tokio::select! {
        () = cancel.cancelled() => return Err(BackendError::Canceled),
        result = TcpStream::connect((host.as_str(), port)) => {
            result.map_err(BackendError::Connect)?
        }
    };
    if backend_uses_tls(to_url, conn.passthrough_tls()) {
        debug!("establishing TLS connection with backend");
        let tls = crate::tls::connect_tls(stream, &host)
            .await
            .map_err(BackendError::Tls)?;
        return Ok(MaybeTlsStream::Tls(tls));
    }
    Ok(MaybeTlsStream::Plain(stream))
}

/// Extract the backend `host` and `port` from the target URL, defaulting
/// the port from the scheme when absent.
fn backend_address(to_url: &Uri) -> Result<(String, u16), BackendError> {
    let host = to_url.host().ok_or(BackendError::MissingHost)?;
    // `TcpStream::connect` expects IPv6 addresses without square brackets.
    let host = host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();
    let port = match to_url.port_u16() {
        Some(port) => port,
        None => match to_url.scheme_str().unwrap_or("").to_lowercase().as_str() {
            "http" => 80,
            "https" | "tls" => 443,
            scheme => return Err(BackendError::NoDefaultPort(scheme.to_string())),
        },
    };
    Ok((host, port))
}

/// TLS is used iff the target scheme asks for it and the tunnel does not
/// already forward raw TLS bytes. Forwarding must not double-terminate TLS.
fn backend_uses_tls(to_url: &Uri, passthrough_tls: bool) -> bool {
    let scheme_tls = matches!(
        to_url.scheme_str().unwrap_or("").to_lowercase().as_str(),
        "https" | "tls"
    );
    scheme_tls && !passthrough_tls
}

/// Write a canned 502 response describing a backend failure, for inbound
/// connections speaking HTTP.
async fn write_http_error<W: AsyncWrite + Unpin>(
    writer: &mut W,
    cause: &BackendError,
) -> io::Result<()> {
    let status = http::StatusCode::BAD_GATEWAY;
    let body = format!("failed to connect to backend: {cause}");
    let response = format!(
        "HTTP/1.1 {} {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Bad Gateway"),
        body.len(),
    );
    writer.write_all(response.as_bytes()).await?;
    writer.flush().await
}
