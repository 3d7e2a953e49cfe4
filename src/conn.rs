//! Inbound proxied connections and their edge metadata.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use std::fmt::Display;
use std::str::FromStr;
use tokio::io::{AsyncRead, AsyncWrite};

/// One inbound proxied connection accepted from a [`Tunnel`](crate::Tunnel).
///
/// Values are produced by the control-plane transport, never by this crate.
/// The forwarding task that accepted a connection owns it exclusively until
/// both sides are closed.
pub trait Conn: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static {
    /// The application protocol the tunnel negotiated for this connection,
    /// e.g. "http", "https", "tcp" or "tls".
    fn proto(&self) -> &str;

    /// Classification of the edge this connection originated from.
    fn edge_type(&self) -> EdgeType;

    /// Whether the tunnel forwards raw TLS bytes unmodified instead of
    /// having terminated TLS itself.
    fn passthrough_tls(&self) -> bool;
}

/// Classification of the originating edge of a [`Conn`].
#[derive(Debug, Default, Copy, Clone, Hash, Eq, PartialEq)]
pub enum EdgeType {
    /// The edge did not report a classification.
    #[default]
    Undefined,
    /// A TCP edge.
    Tcp,
    /// A TLS edge.
    Tls,
    /// An HTTPS edge.
    Https,
}

impl Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Undefined => "undefined",
            Self::Tcp => "tcp",
            Self::Tls => "tls",
            Self::Https => "https",
        })
    }
}

impl FromStr for EdgeType {
    type Err = std::convert::Infallible;

    /// Edge labels are reported by the remote peer, so an unknown label
    /// parses to [`EdgeType::Undefined`] rather than failing.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "tcp" => Self::Tcp,
            "tls" => Self::Tls,
            "https" => Self::Https,
            _ => Self::Undefined,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_labels_round_trip() {
        for edge in [
            EdgeType::Undefined,
            EdgeType::Tcp,
            EdgeType::Tls,
            EdgeType::Https,
        ] {
            assert_eq!(edge.to_string().parse::<EdgeType>().unwrap(), edge);
        }
    }

    #[test]
    fn unknown_labels_parse_to_undefined() {
        assert_eq!(
            "not-an-edge".parse::<EdgeType>().unwrap(),
            EdgeType::Undefined
        );
        assert_eq!("HTTPS".parse::<EdgeType>().unwrap(), EdgeType::Https);
    }
}
