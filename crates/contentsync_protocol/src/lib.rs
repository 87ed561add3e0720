//! # ContentSync Protocol
//!
//! Transfer and wire types for ContentSync.
//!
//! This crate provides:
//! - `PreparedUnit`, the self-contained transfer snapshot of one
//!   content object, and `ExportSet`, the ordered unit collection
//! - `ExportConfig` controlling what an export closure includes
//! - Conflict actions and decisions
//! - Synchronization status and distribution tracking types
//! - Connection-map records
//! - The JSON response envelope every peer endpoint wraps its payload in
//! - Request/response bodies of the peer endpoints
//!
//! This is a pure protocol crate with no I/O. Everything serializes
//! with serde to the HTTP/JSON wire format and the archive manifest.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod conflict;
mod connection;
mod envelope;
mod messages;
mod status;
mod unit;

pub use config::ExportConfig;
pub use conflict::{ConflictAction, ConflictDecision, NameConflict};
pub use connection::{ConnectionEntries, DestinationKey, LinkRecord};
pub use envelope::{codes, Envelope, EnvelopeData};
pub use messages::{
    AddConnectionRequest, ConnectedCopy, ConnectionMutation, DistributeItemRequest,
    PostSummary, PrepareRequest, UpdateItemRequest,
};
pub use status::{DestinationState, DistributionItem, SyncStatus};
pub use unit::{
    ExportSet, PreparedAsset, PreparedHierarchy, PreparedLanguage, PreparedTerm, PreparedUnit,
    RelatedRef,
};
