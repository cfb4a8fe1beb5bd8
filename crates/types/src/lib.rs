// Path: crates/types/src/lib.rs
#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # Haven Types
//!
//! This crate is the foundational library for the Haven storage node,
//! containing all core data structures, error types, and configuration
//! objects.
//!
//! ## Architectural Role
//!
//! As the base crate, `haven-types` has minimal dependencies and is itself a
//! dependency for almost every other crate in the workspace. This structure
//! prevents circular dependencies and provides a stable, canonical definition
//! for shared types like `Did`, `Digest`, `Allocation`, `LocationCommitment`,
//! and the error enums.

/// The default upper bound for a single blob, in bytes (127 * 2^25).
pub const DEFAULT_MAX_BLOB_SIZE: u64 = 127 * (1 << 25);

/// A top-level, crate-wide `Result` type alias with a default error type.
pub type Result<T, E = crate::error::StoreError> = std::result::Result<T, E>;

/// Space reservations that permit an upload for a `(space, digest)` pair.
pub mod allocation;
/// Named abilities, their caveat records, and their result records.
pub mod capability;
/// Signed location commitments and upload tickets.
pub mod claim;
/// The canonical, deterministic binary codec for signed and stored state.
pub mod codec;
/// Shared configuration structures for the node binary.
pub mod config;
/// A unified set of all error types used across the workspace.
pub mod error;
/// Stable identifiers: DIDs, content digests, and links.
pub mod id;
/// Signed invocations, delegations, envelopes, and receipts.
pub mod invocation;
/// Durable replication jobs and their queue records.
pub mod replication;
