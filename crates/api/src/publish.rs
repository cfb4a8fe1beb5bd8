// Path: crates/api/src/publish.rs

//! API for the advertisement chain consumed by the discovery layer.
//!
//! The chain is ordered, singly linked through `prev`, and persisted. Only
//! the publisher appends to it, and it does so under a process-wide mutex,
//! so implementations need not serialize internally.

use async_trait::async_trait;
use haven_types::error::StoreError;
use haven_types::id::{Digest, Link};
use parity_scale_codec::{Decode, Encode};

/// One entry in the advertisement chain: a provider naming a set of content
/// hashes, with metadata pointing back at the claim that justifies it.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct Advertisement {
    /// Canonical encoding of `(space, digest)`; the chain's idempotency key.
    pub context_id: Vec<u8>,
    /// The shard the digests live in. Blob advertisements shard by the blob
    /// itself.
    pub shard: Digest,
    /// Link to the location commitment this advertisement carries.
    pub claim: Link,
    /// Expiry inherited from the commitment, if any.
    pub expiration: Option<u64>,
    /// The advertised digests; a single element for blob advertisements.
    pub digests: Vec<Digest>,
    /// The previous head of the chain, or `None` for the first entry.
    pub prev: Option<Link>,
}

/// The persisted advertisement chain.
#[async_trait]
pub trait AdvertChain: Send + Sync {
    /// The current head: entry link plus that entry's context id.
    async fn head(&self) -> Result<Option<(Link, Vec<u8>)>, StoreError>;

    /// Persists `ad` under `link` and moves the head to it, atomically.
    async fn append(&self, link: &Link, ad: &Advertisement) -> Result<(), StoreError>;

    /// Reads an entry by link.
    async fn get(&self, link: &Link) -> Result<Advertisement, StoreError>;
}
