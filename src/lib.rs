//! Data plane of a reverse-tunneling client SDK.
//!
//! Once the control plane has registered a public endpoint, inbound
//! connections arrive as opaque proxied streams. [`forward`] turns one
//! registered [`Tunnel`] into any number of backend sessions: it accepts
//! each inbound [`Conn`], dials the configured backend target, and splices
//! bytes both ways until either side closes, reporting backend failures to
//! HTTP peers as a 502 response. [`Error`] is the structured failure
//! taxonomy the whole SDK uses to classify, wrap, compare and aggregate
//! errors.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later
#![warn(rust_2018_idioms, missing_debug_implementations)]
#![warn(clippy::pedantic, clippy::cargo, clippy::unwrap_used)]
#![forbid(unsafe_code)]
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

pub mod conn;
pub mod error;
pub mod forward;
pub mod session;
pub mod tls;

pub use conn::{Conn, EdgeType};
pub use error::{Cause, Error, ErrorKind, Errors};
pub use forward::{Forwarder, forward};
pub use session::{Session, Tunnel};
