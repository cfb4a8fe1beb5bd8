// Path: crates/services/src/lib.rs
#![forbid(unsafe_code)]

//! # Haven Services
//!
//! The command side of the Haven node: the capability gate that authenticates
//! and routes signed invocations, the allocation/accept engine behind
//! `blob/allocate`, `blob/accept`, and `replica/allocate`, the replication
//! engine that pulls blobs from peer nodes, and the publisher that feeds the
//! discovery layer.
//!
//! Everything here coordinates through the `haven-api` seams; the only
//! process-wide lock is the publisher's chain-head mutex.

/// The allocation / accept engine and its ability handlers.
pub mod blob;
/// The identity & capability gate.
pub mod gate;
/// The advertisement publisher.
pub mod publish;
/// The durable replication engine and its worker pool.
pub mod replication;
/// HTTP clients for peers, the upload service, and the indexing service.
pub mod remote;
/// Wall-clock helpers shared by the handlers.
pub mod time;

pub use blob::{BlobEngine, EngineConfig};
pub use gate::CapabilityGate;
pub use publish::Publisher;
pub use replication::ReplicationEngine;
