//! # ContentSync Engine
//!
//! The synchronization engine of ContentSync.
//!
//! This crate provides:
//! - The content preparer (nested-reference extraction, dynamic-string
//!   placeholders, meta/term/asset/language/hierarchy projection)
//! - The export engine with cycle-safe closure recursion and archive
//!   bundling
//! - The conflict resolver
//! - The import engine with placeholder re-internalization and
//!   post-import bookkeeping
//! - Connection maps with reconciliation
//! - The distributor fanning one export set out to N destinations
//! - The remote client abstraction with a loopback implementation
//!
//! ## Architecture
//!
//! The engine is synchronous per request, like the reference system:
//! each export, import or distribution runs to completion inside its
//! caller's request. Per-root mutation is serialized by treating each
//! root GID as a mutex domain, and no lock is held while a remote call
//! is in flight.
//!
//! ## Key invariants
//!
//! - Any object touched more than once during an export is prepared
//!   exactly once (reserve-first map order breaks reference cycles)
//! - A single failed unit never aborts an import batch (at-least-once,
//!   not exactly-once; no automatic rollback)
//! - Reconciliation never drops connection-map entries for peers that
//!   are merely unreachable
//! - A failed destination is marked `failed` and the fan-out moves on;
//!   nothing retries automatically

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod archive;
mod catalog;
mod client;
mod conflict;
mod connections;
mod distributor;
mod error;
mod export;
mod import;
mod placeholders;
mod prepare;
mod rules;

pub use archive::{read_archive, write_archive, MediaBag, MANIFEST_ENTRY, MEDIA_PREFIX};
pub use catalog::RemoteCatalog;
pub use client::{
    ClientTimeouts, ConnectionCredential, LoopbackClient, MockRemoteClient, PeerConnection,
    PeerEndpoint, PeerRegistry, PeerRequest, RemoteClient, RequestMethod,
};
pub use conflict::{ConflictResolver, ResolutionReport};
pub use connections::{CheckReport, ConnectionMaps};
pub use distributor::{mark_as_root, DistributionOptions, Distributor};
pub use error::{SyncError, SyncResult};
pub use export::ExportEngine;
pub use import::{ImportEngine, ImportReport, UnitOutcome};
pub use placeholders::{has_unresolved_placeholders, resolve_id_placeholders, DynamicStrings};
pub use prepare::{ContentPreparer, MetaTransform, MetaTransformRegistry};
pub use rules::{normalize_nav_blocks, NestedReferenceRule, RefKind, ReferenceRuleSet};
