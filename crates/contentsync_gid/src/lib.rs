//! # ContentSync GID
//!
//! Global identifier codec for ContentSync.
//!
//! A GID names one synchronized content object across every node that
//! holds a copy of it. It encodes the triple (origin node id, content id,
//! network address) as a canonical string:
//!
//! - `"3-128"`: content `128` rooted on node `3` of the local network
//! - `"3-128-example.org"`: the same, rooted on a remote network
//!
//! Absence of the network address means "local to the current network".
//! Two GIDs are equal iff all three components match after the address
//! has been canonicalized (scheme, leading `www.` and trailing `/`
//! stripped).
//!
//! This is a pure codec crate with no I/O. Malformed input decodes to
//! `None`, never a panic.
//!
//! ## Usage
//!
//! ```
//! use contentsync_gid::Gid;
//!
//! let gid = Gid::remote(3, 128, "https://www.example.org/");
//! assert_eq!(gid.encode(), "3-128-https://www.example.org/");
//! assert_eq!(gid, Gid::remote(3, 128, "example.org"));
//!
//! let parsed = Gid::parse("3-128").unwrap();
//! assert!(parsed.is_local());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod gid;

pub use gid::{canonicalize_address, is_valid_wire_gid, Gid};
