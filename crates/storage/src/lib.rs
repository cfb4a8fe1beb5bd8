// Path: crates/storage/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
        clippy::indexing_slicing
    )
)]

//! Persistent storage for the Haven node: redb-backed allocation, claim, and
//! advertisement-chain stores, a filesystem blob store with atomic writes,
//! and the durable replication job queue.
//!
//! Every store maps backend faults to `StoreError::Backend` and keeps point
//! operations linearizable per key. The queue is the sole writer of its
//! tables and survives ungraceful restarts with at-least-once semantics.

pub mod advert_chain;
pub mod allocation_store;
pub mod blob_store;
pub mod claim_store;
pub mod job_queue;

pub use advert_chain::RedbAdvertChain;
pub use allocation_store::RedbAllocationStore;
pub use blob_store::FsBlobStore;
pub use claim_store::RedbClaimStore;
pub use job_queue::RedbJobQueue;

use haven_types::error::StoreError;

pub(crate) fn backend<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Backend(e.to_string())
}
