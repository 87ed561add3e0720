//! # ContentSync Server
//!
//! Peer-facing endpoint surface for ContentSync.
//!
//! This crate provides:
//! - Handlers for every peer endpoint (`site_name`, `check_auth`,
//!   `add_connection`, posts list/get/prepare, per-GID connections,
//!   `connected_posts`, `distribution/distribute-item`,
//!   `distribution/update-item`)
//! - Basic-credential verification and the mutual-connection ledger
//! - The `SyncServer` facade dispatching requests by path and wrapping
//!   every response in the JSON envelope
//!
//! # Transport
//!
//! The server is transport-agnostic: in a real deployment you would
//! expose HTTP routes that build a `PeerRequest` per call and hand it
//! to `SyncServer::handle`. In tests and single-process setups the
//! engine's loopback client routes to the same entry point.
//!
//! # Authentication
//!
//! Callers authenticate with HTTP Basic credentials (a login plus a
//! reversibly-obfuscated application password). The `Origin` header
//! carries the caller's own canonical network address, which must be
//! present in the mutual-connection ledger for everything beyond the
//! handshake endpoints. The envelope's inner `data.status` is
//! authoritative for success and failure.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod handler;
mod server;

pub use auth::{ConnectionLedger, CredentialStore};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use server::SyncServer;
