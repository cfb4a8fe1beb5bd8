// Path: crates/types/src/claim.rs

//! Signed location commitments and the ephemeral upload tickets that precede
//! them.

use crate::id::{Did, Digest};
use parity_scale_codec::{Decode, Encode};

/// The unsigned body of a location commitment.
///
/// A commitment proves "the issuer will serve `content` for `audience` at
/// these URLs until `expiration`". The signature covers the canonical
/// encoding of this payload.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct CommitmentPayload {
    /// The node asserting the location (always the local node for fresh
    /// commitments).
    pub issuer: Did,
    /// The tenant space the assertion is addressed to.
    pub audience: Did,
    /// The content hash being served.
    pub content: Digest,
    /// Candidate URLs at which the content is served. The first entry is the
    /// one consumers fetch from.
    pub locations: Vec<String>,
    /// Optional expiry as unix seconds; `None` means no stated expiry.
    pub expiration: Option<u64>,
}

/// A signed location commitment, as persisted in the claim store and handed
/// to the publisher.
///
/// The commitment's link is the hash of the canonical encoding of the whole
/// signed structure; computing it requires the hash function and therefore
/// lives in `haven-crypto`.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct LocationCommitment {
    /// The signed body.
    pub payload: CommitmentPayload,
    /// Ed25519 signature by `payload.issuer` over the canonical payload
    /// bytes.
    pub signature: Vec<u8>,
}

/// A presigned upload address: URL plus the exact headers the writer must
/// send.
///
/// Tickets are derived, not stored; the node recomputes the signature on
/// arrival. Idempotent re-puts of matching content are permitted, so a ticket
/// is not single-use.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct UploadAddress {
    /// The full PUT URL, including the signature query parameters.
    pub url: String,
    /// Headers covered by the ticket signature, in canonical order.
    pub headers: Vec<(String, String)>,
    /// Expiry of the ticket as unix seconds.
    pub expires: u64,
}
