// Path: crates/api/src/store.rs

//! API for the three persistent stores the command handlers coordinate.
//!
//! Each store is linearizable per key and exposes point operations only; the
//! `list` operations on the allocation store are O(matches) via
//! prefix-encoded keys. Implementations must make writes atomic at the store
//! boundary: a blob is either fully present with a verified digest, or
//! absent.

use async_trait::async_trait;
use bytes::Bytes;
use haven_types::allocation::Allocation;
use haven_types::claim::LocationCommitment;
use haven_types::error::StoreError;
use haven_types::id::{Did, Digest, Link};

/// Encodes a u64 into a big-endian byte array, suitable for ordered key scans.
#[inline]
pub fn be64(x: u64) -> [u8; 8] {
    x.to_be_bytes()
}

/// Records reservations of local capacity, keyed by digest with a secondary
/// index by space.
#[async_trait]
pub trait AllocationStore: Send + Sync {
    /// Persists a new reservation. Allocations are immutable; re-putting the
    /// same `(digest, space, cause)` is a no-op.
    async fn put(&self, allocation: Allocation) -> Result<(), StoreError>;

    /// All reservations for a digest, across spaces.
    async fn list(&self, digest: &Digest) -> Result<Vec<Allocation>, StoreError>;

    /// Reservations for a digest scoped to one space.
    async fn list_for_space(
        &self,
        digest: &Digest,
        space: &Did,
    ) -> Result<Vec<Allocation>, StoreError>;

    /// Any single reservation for the digest, or `NotFound`.
    async fn get_any(&self, digest: &Digest) -> Result<Allocation, StoreError>;
}

/// Content-addressed object store keyed by multihash.
///
/// `put` verifies the body hashes to the presented digest and fails with
/// `DataInconsistent` otherwise, leaving no partial state behind.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores a blob after verifying its digest. Re-putting an existing
    /// digest with matching content is an idempotent success.
    async fn put(&self, digest: &Digest, body: Bytes) -> Result<(), StoreError>;

    /// The full body of a stored blob.
    async fn get(&self, digest: &Digest) -> Result<Bytes, StoreError>;

    /// An inclusive byte range of a stored blob; `RangeNotSatisfiable` when
    /// the range falls outside it.
    async fn get_range(&self, digest: &Digest, start: u64, end: u64) -> Result<Bytes, StoreError>;

    /// Size in bytes of a stored blob, or `NotFound`.
    async fn stat(&self, digest: &Digest) -> Result<u64, StoreError>;

    /// Set membership test.
    async fn contains(&self, digest: &Digest) -> Result<bool, StoreError>;
}

/// Persists signed location commitments keyed by their link.
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Persists the canonical archive of a signed commitment under its link.
    async fn put(
        &self,
        link: &Link,
        commitment: &LocationCommitment,
        archive: Vec<u8>,
    ) -> Result<(), StoreError>;

    /// The archived bytes, byte-for-byte as persisted.
    async fn get_archive(&self, link: &Link) -> Result<Vec<u8>, StoreError>;

    /// The decoded commitment.
    async fn get(&self, link: &Link) -> Result<LocationCommitment, StoreError>;

    /// An unexpired commitment for `(audience, content)`, if one exists.
    /// Backs the idempotent re-accept path.
    async fn find_live(
        &self,
        audience: &Did,
        content: &Digest,
        now: u64,
    ) -> Result<Option<(Link, LocationCommitment)>, StoreError>;
}
