//! # ContentSync Store
//!
//! Content object model and persistence abstraction for ContentSync.
//!
//! This crate provides:
//! - `ContentObject`, the fixed core schema plus an open meta bag
//! - The `PostStore` trait, the contract the synchronization engine
//!   consumes (the CMS persistence layer itself is an external
//!   collaborator)
//! - `MemoryPostStore`, an in-memory store used by tests and fixtures
//! - The node/network model with a scoped node-switch guard
//! - `Cache` with request-scoped and TTL-bound implementations
//! - The `TranslationProvider` trait and registry
//!
//! ## Architecture
//!
//! The engine never touches CMS storage directly. Every read and write
//! goes through `PostStore`, and every operation that needs a specific
//! node's data runs inside that node's context. Switching the current
//! node is a scoped critical section: the previous context is restored
//! on every exit path, including panics, via the RAII guard.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod error;
mod meta;
mod node;
mod object;
mod store;
mod translation;
mod types;

pub use cache::{Cache, RequestCache, TtlCache, REMOTE_LISTING_TTL, REMOTE_OBJECT_TTL};
pub use error::{StoreError, StoreResult};
pub use meta::{sync_meta, MetaExclusions};
pub use node::{LocalNetwork, Node, NodeSettings, NodeSwitchGuard};
pub use object::{AssetFile, ContentObject, Term};
pub use store::{MemoryPostStore, PostStore};
pub use translation::{
    LanguageInfo, MetaTranslationProvider, TranslationProvider, TranslationRegistry,
};
pub use types::{ContentId, NodeId};
