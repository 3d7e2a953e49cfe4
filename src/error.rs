//! Typed failure categories shared across the SDK.
//!
//! Every failure carries its category, a human-readable message embedding
//! the underlying cause, and access to that cause. Categories are matchable
//! with [`Error::is`] regardless of the context a value carries, so callers
//! can branch on "is this a dial failure?" without string matching.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use std::fmt;
use thiserror::Error;

/// Underlying cause carried by a failure.
pub type Cause = Box<dyn std::error::Error + Send + Sync>;

/// A failure produced by the SDK, tagged with the category it arose from.
#[derive(Debug, Error)]
pub enum Error {
    /// Authentication was rejected by the remote server, or the
    /// authentication request could not be sent at all.
    #[error("{}: {source}", auth_context(.remote))]
    Auth {
        /// Whether the failure was generated by the remote server rather
        /// than while sending the authentication request.
        remote: bool,
        /// The underlying cause.
        source: Cause,
    },
    /// The tunnel's accept operation failed.
    #[error("failed to accept connection: {source}")]
    Accept {
        /// The underlying cause.
        source: Cause,
    },
    /// A tunnel could not be started.
    #[error("failed to start tunnel: {source}")]
    Listen {
        /// The underlying cause.
        source: Cause,
    },
    /// A proxy dialer could not be constructed from the configured URL.
    #[error("failed to construct proxy dialer from \"{url}\": {source}")]
    ProxyInit {
        /// The provided proxy URL, kept as the caller's original text so
        /// the message is not normalized behind their back.
        url: String,
        /// The underlying cause.
        source: Cause,
    },
    /// The ngrok server could not be dialed.
    #[error("failed to dial ngrok server with address \"{addr}\": {source}")]
    SessionDial {
        /// The address to which a connection was attempted.
        addr: String,
        /// The underlying cause.
        source: Cause,
    },
    /// Zero or more failures recorded over repeated attempts.
    #[error(transparent)]
    Multiple(Errors),
}

fn auth_context(remote: &bool) -> &'static str {
    if *remote {
        "authentication failed"
    } else {
        "failed to send authentication request"
    }
}

/// The category of an [`Error`], independent of any carried context.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum ErrorKind {
    /// Authentication failure.
    Auth,
    /// Tunnel accept failure.
    Accept,
    /// Tunnel start failure.
    Listen,
    /// Proxy dialer construction failure.
    ProxyInit,
    /// Server dial failure.
    SessionDial,
}

impl Error {
    /// Whether this failure belongs to `kind`.
    ///
    /// Aggregates never match a kind themselves; they match if any of
    /// their recorded causes does.
    #[must_use]
    pub fn is(&self, kind: ErrorKind) -> bool {
        match self {
            Self::Auth { .. } => kind == ErrorKind::Auth,
            Self::Accept { .. } => kind == ErrorKind::Accept,
            Self::Listen { .. } => kind == ErrorKind::Listen,
            Self::ProxyInit { .. } => kind == ErrorKind::ProxyInit,
            Self::SessionDial { .. } => kind == ErrorKind::SessionDial,
            Self::Multiple(errs) => errs.causes().iter().any(|e| e.is(kind)),
        }
    }

    /// An authentication failure. `remote` distinguishes a rejection by
    /// the server from a failure to send the request.
    pub fn auth(remote: bool, source: impl Into<Cause>) -> Self {
        Self::Auth {
            remote,
            source: source.into(),
        }
    }

    /// An accept failure on a tunnel.
    pub fn accept(source: impl Into<Cause>) -> Self {
        Self::Accept {
            source: source.into(),
        }
    }

    /// A failure to start a tunnel.
    pub fn listen(source: impl Into<Cause>) -> Self {
        Self::Listen {
            source: source.into(),
        }
    }

    /// A failure to construct a proxy dialer from `url`.
    pub fn proxy_init(url: impl Into<String>, source: impl Into<Cause>) -> Self {
        Self::ProxyInit {
            url: url.into(),
            source: source.into(),
        }
    }

    /// A failure to dial the server at `addr`.
    pub fn session_dial(addr: impl Into<String>, source: impl Into<Cause>) -> Self {
        Self::SessionDial {
            addr: addr.into(),
            source: source.into(),
        }
    }
}

/// An ordered aggregate of failures.
///
/// Typically used to collect the outcome of repeated attempts; rendering
/// lists the newest failure first so the most recent attempt is visible
/// at the top.
#[derive(Debug, Default)]
pub struct Errors(Vec<Error>);

impl Errors {
    /// An aggregate holding no failures.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Record a failure. `None` is ignored so results can be fed in
    /// without checking them first.
    pub fn add(&mut self, err: impl Into<Option<Error>>) {
        if let Some(err) = err.into() {
            self.0.push(err);
        }
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of recorded failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Every recorded cause, oldest first.
    #[must_use]
    pub fn causes(&self) -> &[Error] {
        &self.0
    }

    /// Promote the aggregate to a real failure, or `None` if nothing was
    /// recorded. Callers must not surface an empty aggregate as an error.
    #[must_use]
    pub fn into_error(self) -> Option<Error> {
        if self.0.is_empty() {
            None
        } else {
            Some(Error::Multiple(self))
        }
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [] => f.write_str("no errors recorded"),
            [sole] => write!(f, "{sole}"),
            all => {
                f.write_str("multiple errors occurred:\n")?;
                for err in all.iter().rev() {
                    writeln!(f, "{err}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for Errors {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io;

    fn cause(msg: &str) -> io::Error {
        io::Error::other(msg.to_string())
    }

    #[test]
    fn auth_message_depends_on_origin() {
        let remote = Error::auth(true, cause("bad token"));
        assert_eq!(remote.to_string(), "authentication failed: bad token");
        let local = Error::auth(false, cause("pipe broken"));
        assert_eq!(
            local.to_string(),
            "failed to send authentication request: pipe broken"
        );
    }

    #[test]
    fn single_cause_messages() {
        assert_eq!(
            Error::accept(cause("eof")).to_string(),
            "failed to accept connection: eof"
        );
        assert_eq!(
            Error::listen(cause("quota")).to_string(),
            "failed to start tunnel: quota"
        );
        assert_eq!(
            Error::proxy_init("socks5://localhost:1080", cause("bad scheme")).to_string(),
            "failed to construct proxy dialer from \"socks5://localhost:1080\": bad scheme"
        );
        assert_eq!(
            Error::session_dial("connect.example.com:443", cause("refused")).to_string(),
            "failed to dial ngrok server with address \"connect.example.com:443\": refused"
        );
    }

    #[test]
    fn proxy_url_renders_verbatim() {
        // No URL normalization; a trailing slash appears iff the caller
        // supplied one.
        assert_eq!(
            Error::proxy_init("socks5://localhost:1080", cause("x")).to_string(),
            "failed to construct proxy dialer from \"socks5://localhost:1080\": x"
        );
        assert_eq!(
            Error::proxy_init("http://proxy.example.com/", cause("x")).to_string(),
            "failed to construct proxy dialer from \"http://proxy.example.com/\": x"
        );
    }

    #[test]
    fn kind_matches_category_not_context() {
        let a = Error::session_dial("a:1", cause("x"));
        let b = Error::session_dial("b:2", cause("y"));
        assert!(a.is(ErrorKind::SessionDial));
        assert!(b.is(ErrorKind::SessionDial));
        assert!(!a.is(ErrorKind::Accept));
        assert!(!a.is(ErrorKind::Auth));
    }

    #[test]
    fn cause_is_reachable_through_source() {
        let err = Error::accept(cause("underlying"));
        let source = err.source().expect("accept failure carries a cause");
        assert_eq!(source.to_string(), "underlying");
    }

    #[test]
    fn empty_aggregate_is_guarded() {
        let errs = Errors::new();
        assert!(errs.is_empty());
        assert_eq!(errs.to_string(), "no errors recorded");
        assert!(errs.into_error().is_none());
    }

    #[test]
    fn adding_nothing_is_a_noop() {
        let mut errs = Errors::new();
        errs.add(None);
        assert!(errs.is_empty());
        errs.add(Error::listen(cause("x")));
        assert_eq!(errs.len(), 1);
        errs.add(None);
        assert_eq!(errs.len(), 1);
    }

    #[test]
    fn singleton_aggregate_renders_its_sole_cause() {
        let mut errs = Errors::new();
        errs.add(Error::listen(cause("quota")));
        assert_eq!(errs.to_string(), "failed to start tunnel: quota");
    }

    #[test]
    fn aggregate_renders_newest_first() {
        let mut errs = Errors::new();
        errs.add(Error::session_dial("a:1", cause("first")));
        errs.add(Error::session_dial("a:1", cause("second")));
        errs.add(Error::session_dial("a:1", cause("third")));
        assert_eq!(
            errs.to_string(),
            "multiple errors occurred:\n\
             failed to dial ngrok server with address \"a:1\": third\n\
             failed to dial ngrok server with address \"a:1\": second\n\
             failed to dial ngrok server with address \"a:1\": first\n"
        );
    }

    #[test]
    fn aggregate_identity_delegates_to_causes() {
        let mut errs = Errors::new();
        errs.add(Error::session_dial("a:1", cause("x")));
        errs.add(Error::auth(true, cause("y")));
        let err = errs.into_error().expect("non-empty aggregate");
        assert!(err.is(ErrorKind::SessionDial));
        assert!(err.is(ErrorKind::Auth));
        assert!(!err.is(ErrorKind::Listen));
    }

    #[test]
    fn nested_aggregate_identity() {
        let mut inner = Errors::new();
        inner.add(Error::listen(cause("x")));
        let mut outer = Errors::new();
        outer.add(inner.into_error());
        let err = outer.into_error().expect("non-empty aggregate");
        assert!(err.is(ErrorKind::Listen));
    }

    #[test]
    fn causes_preserve_insertion_order() {
        let mut errs = Errors::new();
        errs.add(Error::accept(cause("first")));
        errs.add(Error::accept(cause("second")));
        let causes = errs.causes();
        assert_eq!(causes.len(), 2);
        assert!(causes[0].to_string().contains("first"));
        assert!(causes[1].to_string().contains("second"));
    }
}
