// Path: crates/types/src/allocation.rs

//! Space reservations created by `blob/allocate` and `replica/allocate`.

use crate::id::{Did, Digest, Link};
use parity_scale_codec::{Decode, Encode};

/// A reservation of local capacity for a specific `(space, digest)` pair.
///
/// A non-expired allocation is what permits an upload for its digest by a
/// writer scoped to its space. Allocations are never mutated after creation;
/// they expire passively and expired records may be garbage-collected but
/// never resurrected.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct Allocation {
    /// The tenant space this reservation belongs to.
    pub space: Did,
    /// The content hash the reservation covers.
    pub digest: Digest,
    /// Reserved size in bytes.
    pub size: u64,
    /// Expiry as unix seconds.
    pub expires: u64,
    /// Link to the invocation that created this reservation.
    pub cause: Link,
}

impl Allocation {
    /// True once the reservation has passed its expiry.
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_inclusive_at_the_boundary() {
        let alloc = Allocation {
            space: Did::from_ed25519(&[1u8; 32]),
            digest: Digest::sha2_256([2u8; 32]),
            size: 5,
            expires: 100,
            cause: Link([0u8; 32]),
        };
        assert!(!alloc.is_expired(99));
        assert!(alloc.is_expired(100));
        assert!(alloc.is_expired(101));
    }
}
