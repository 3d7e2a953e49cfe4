//! Consumed control-plane abstractions.
//!
//! [`Session`] and [`Tunnel`] are owned by the session-management
//! collaborator; the forwarding engine only consumes their contract and
//! never constructs them.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use crate::conn::Conn;
use std::future::Future;
use std::io;

/// Opaque handle to the control connection.
pub trait Session: Send + Sync + 'static {
    /// Identifying metadata, used only to annotate forwarding log spans.
    fn id(&self) -> String;
}

/// A registered public endpoint that yields inbound proxied connections.
pub trait Tunnel: Send + Sync + 'static {
    /// Connection type produced by [`accept`](Tunnel::accept).
    type Conn: Conn;
    /// The session type this tunnel was started on.
    type Session: Session;

    /// Block until the next inbound connection arrives.
    ///
    /// A returned error is fatal: the tunnel is no longer usable.
    fn accept(&self) -> impl Future<Output = io::Result<Self::Conn>> + Send;

    /// The public URL this tunnel receives traffic at.
    fn url(&self) -> String;

    /// Human-readable description of what this tunnel forwards to.
    fn forwards_to(&self) -> String;

    /// The tunnel's parent session.
    fn session(&self) -> &Self::Session;

    /// Close the tunnel. This sends a close message over the parent
    /// session, so callers should bound it with a deadline.
    fn close(&self) -> impl Future<Output = io::Result<()>> + Send;
}
