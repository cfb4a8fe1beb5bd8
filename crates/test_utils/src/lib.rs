// Path: crates/test_utils/src/lib.rs
#![forbid(unsafe_code)]

//! In-memory store implementations, recording stub clients, and identity
//! fixtures shared by tests across the workspace.
//!
//! The in-memory stores honor the same contracts as the redb-backed ones
//! (digest verification, linearizable point operations, claim-index
//! semantics) so engine tests exercise real store behavior without disk.

pub mod envelopes;
pub mod stores;
pub mod stubs;

pub use envelopes::service_envelope;
pub use stores::{
    MemAdvertChain, MemAllocationStore, MemBlobStore, MemClaimStore, MemJobQueue,
};
pub use stubs::{StubIndexingService, StubPeerTransport, StubUploadService};
