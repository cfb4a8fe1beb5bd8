// Path: crates/api/src/lib.rs

//! # Haven API Crate Lints
//!
//! This crate enforces a strict set of lints to ensure high-quality,
//! panic-free, and well-documented code. Panics are disallowed in non-test
//! code to promote robust error handling.
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented,
        clippy::indexing_slicing
    )
)]
//! # Haven API
//!
//! Core traits and interfaces for the Haven storage node. This crate defines
//! the stable contract between the command handlers and everything they
//! coordinate: the three stores, the durable job queue, the advertisement
//! chain, the PDP seam, and the remote collaborators (upload service,
//! indexing service, peer nodes).
//!
//! All cross-component references travel by `Link` or `Digest`; no trait
//! here hands out pointers into another component's state.

/// Unified traits for signing keys and signatures.
pub mod crypto;
/// Re-exports all core error types from the central `haven-types` crate.
pub mod error;
/// The ability-handler contract the capability gate dispatches to.
pub mod handler;
/// The narrow piece-lookup / piece-accept seam to the PDP subsystem.
pub mod pdp;
/// The advertisement chain consumed by the discovery layer.
pub mod publish;
/// The durable replication job queue.
pub mod queue;
/// Clients for the remote collaborators: peers, upload service, indexing.
pub mod remote;
/// The allocation, blob, and claim stores.
pub mod store;

/// A curated set of the most commonly used traits and types.
pub mod prelude {
    pub use crate::error::{
        CryptoError, EngineError, ErrorCode, GateError, PresignError, PublishError,
        ReplicationError, StoreError,
    };
    pub use crate::handler::{AbilityHandler, HandlerOutput};
    pub use crate::pdp::PieceFinder;
    pub use crate::publish::AdvertChain;
    pub use crate::queue::{JobId, JobQueue};
    pub use crate::remote::{IndexingService, PeerTransport, UploadService};
    pub use crate::store::{AllocationStore, BlobStore, ClaimStore};
}
