// Path: crates/types/src/capability/mod.rs

//! Named abilities and their typed caveat / result records.
//!
//! Each ability is a verb plus a caveat record (the invocation's typed
//! arguments) and a result record (the ok branch of its receipt). Handlers
//! decode the caveat bytes with [`crate::codec::from_bytes_canonical`] and
//! encode their result the same way; the records here are the whole contract.

use crate::claim::UploadAddress;
use crate::id::{Did, Digest, Link};
use crate::invocation::Await;
use parity_scale_codec::{Decode, Encode};

/// Reserve space for an upload. Service-reserved: `with` must be the node.
pub const BLOB_ALLOCATE: &str = "blob/allocate";
/// Finalize a completed upload. Service-reserved.
pub const BLOB_ACCEPT: &str = "blob/accept";
/// Serve a stored blob to an authorized reader.
pub const BLOB_RETRIEVE: &str = "blob/retrieve";
/// Reserve space for a copy pulled from a peer. Service-reserved.
pub const REPLICA_ALLOCATE: &str = "replica/allocate";
/// Self-issued: perform the transfer reserved by `replica/allocate`.
pub const REPLICA_TRANSFER: &str = "replica/transfer";
/// Self-issued claim that the node serves a digest at given URLs.
pub const ASSERT_LOCATION: &str = "assert/location";
/// Deliver a receipt to the upload service.
pub const UCAN_CONCLUDE: &str = "ucan/conclude";
/// Cache a location claim with the indexing service.
pub const CLAIM_CACHE: &str = "claim/cache";
/// Ask a peer for short-lived delegations.
pub const ACCESS_GRANT: &str = "access/grant";

/// The abilities whose subject must be this node and whose issuer chain must
/// reach the service principal.
pub const SERVICE_RESERVED: &[&str] = &[BLOB_ALLOCATE, BLOB_ACCEPT, REPLICA_ALLOCATE];

/// A digest plus its claimed size, as named by the upload service.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct BlobRef {
    /// Content hash of the blob.
    pub digest: Digest,
    /// Size in bytes the writer claims for it.
    pub size: u64,
}

/// Caveats of `blob/allocate`.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct BlobAllocateCaveats {
    /// Tenant space requesting the reservation.
    pub space: Did,
    /// The blob to reserve for.
    pub blob: BlobRef,
    /// Link to the upstream invocation that caused this allocation.
    pub cause: Link,
}

/// Ok result of `blob/allocate`.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct BlobAllocateOk {
    /// Bytes newly reserved; 0 when a prior reservation still covers the
    /// blob.
    pub size: u64,
    /// Where to upload, or `None` when the bytes are already stored.
    pub address: Option<UploadAddress>,
}

/// Caveats of `blob/accept`.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct BlobAcceptCaveats {
    /// Tenant space finalizing the upload.
    pub space: Did,
    /// The blob being finalized.
    pub blob: BlobRef,
    /// Promise on the upload task whose completion triggered this accept.
    pub put: Await,
}

/// Ok result of `blob/accept` and `replica/transfer`.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct BlobAcceptOk {
    /// Link to the persisted location commitment.
    pub site: Link,
    /// Link to the piece-accept invocation when PDP is enabled.
    pub pdp: Option<Link>,
}

/// Caveats of `replica/allocate`.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct ReplicaAllocateCaveats {
    /// Tenant space the replica is made for.
    pub space: Did,
    /// The blob to replicate.
    pub blob: BlobRef,
    /// Archived `LocationCommitment` naming the primary node's URL, as a
    /// nested signed delegation.
    pub site: Vec<u8>,
    /// Link to the upstream invocation that requested the replication.
    pub cause: Link,
}

/// Ok result of `replica/allocate`.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct ReplicaAllocateOk {
    /// Bytes newly reserved locally.
    pub size: u64,
    /// Promise resolving to the transfer's eventual commitment link.
    pub site: Await,
}

/// Caveats of the self-issued `replica/transfer`.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct ReplicaTransferCaveats {
    /// Tenant space the replica is made for.
    pub space: Did,
    /// The blob being transferred.
    pub blob: BlobRef,
    /// Archived source `LocationCommitment`.
    pub site: Vec<u8>,
    /// Link to the `replica/allocate` invocation that spawned the transfer.
    pub cause: Link,
}

/// Caveats of the self-issued `assert/location` claim.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct AssertLocationCaveats {
    /// Tenant space the claim is addressed to.
    pub space: Did,
    /// Content hash being claimed.
    pub content: Digest,
    /// URLs at which the content is served.
    pub location: Vec<String>,
    /// Optional byte range limitation, inclusive.
    pub range: Option<(u64, u64)>,
}

/// Caveats of `ucan/conclude`: a receipt shipped to the upload service.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct UcanConcludeCaveats {
    /// Canonical encoding of the signed receipt being delivered.
    pub receipt: Vec<u8>,
}

/// Provider contact details shipped with a cached claim.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct ProviderInfo {
    /// Multiaddr-or-URL strings at which the provider is reachable.
    pub addresses: Vec<String>,
}

/// Caveats of `claim/cache`: a claim plus where to fetch from.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct ClaimCacheCaveats {
    /// Canonical encoding of the signed location commitment.
    pub claim: Vec<u8>,
    /// The provider addresses to associate with the claim.
    pub provider: ProviderInfo,
}

/// One requested grant inside `access/grant`.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct GrantRequest {
    /// The ability being requested, e.g. `blob/retrieve`.
    pub can: String,
}

/// Caveats of `access/grant`, sent to a peer node.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct AccessGrantCaveats {
    /// The abilities requested.
    pub att: Vec<GrantRequest>,
    /// Optional causal link.
    pub cause: Option<Link>,
}

/// Ok result of `access/grant`.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct AccessGrantOk {
    /// Canonical encodings of the issued delegations, one per requested
    /// ability.
    pub delegations: Vec<Vec<u8>>,
}
