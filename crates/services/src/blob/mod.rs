// Path: crates/services/src/blob/mod.rs
//! The allocation / accept engine.
//!
//! Implements the three service-reserved abilities: `blob/allocate` reserves
//! space and derives an upload ticket, `blob/accept` finalizes a completed
//! upload into a signed location commitment, and `replica/allocate` reserves
//! space for a copy pulled from a peer and enqueues the transfer job. The
//! engine owns no state of its own; it coordinates the three stores, the
//! presign authority, the publisher, and the job queue.

mod handlers;

pub use handlers::{AcceptHandler, AllocateHandler, ReplicaAllocateHandler};

use crate::publish::Publisher;
use crate::time::now_secs;
use haven_api::crypto::NodeSigner;
use haven_api::pdp::PieceFinder;
use haven_api::queue::JobQueue;
use haven_api::store::{AllocationStore, BlobStore, ClaimStore};
use haven_crypto::envelope::{sign_commitment, sign_invocation};
use haven_crypto::hash::link_of;
use haven_crypto::{NodeIdentity, PresignAuthority};
use haven_types::allocation::Allocation;
use haven_types::capability::{
    AssertLocationCaveats, BlobAcceptOk, BlobAllocateOk, BlobRef, ReplicaAllocateCaveats,
    ReplicaAllocateOk, ReplicaTransferCaveats, ASSERT_LOCATION, REPLICA_TRANSFER,
};
use haven_types::claim::{CommitmentPayload, LocationCommitment};
use haven_types::codec;
use haven_types::error::EngineError;
use haven_types::id::{Did, Link};
use haven_types::invocation::{Await, InvocationPayload};
use haven_types::replication::{ReplicaSource, ReplicationJob};
use std::sync::Arc;
use tokio::sync::Notify;

/// Engine tuning, lifted from the node configuration at wiring time.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Upper bound for a single blob, in bytes.
    pub max_blob_size: u64,
    /// Lifetime of presigned upload tickets, in seconds.
    pub ticket_ttl_secs: u64,
    /// Lifetime of allocations, in seconds.
    pub allocation_ttl_secs: u64,
    /// Expiry applied to fresh commitments, in seconds; `None` issues
    /// commitments without a stated expiry.
    pub commitment_ttl_secs: Option<u64>,
    /// Public base URL of this node, used in commitment locations.
    pub public_url: String,
}

/// The allocation / accept engine.
pub struct BlobEngine {
    identity: Arc<NodeIdentity>,
    allocations: Arc<dyn AllocationStore>,
    blobs: Arc<dyn BlobStore>,
    claims: Arc<dyn ClaimStore>,
    presign: PresignAuthority,
    pieces: Option<Arc<dyn PieceFinder>>,
    publisher: Arc<Publisher>,
    queue: Arc<dyn JobQueue>,
    /// Wakes replication workers after an enqueue.
    queue_wake: Arc<Notify>,
    config: EngineConfig,
}

impl BlobEngine {
    /// Wires the engine over its collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity: Arc<NodeIdentity>,
        allocations: Arc<dyn AllocationStore>,
        blobs: Arc<dyn BlobStore>,
        claims: Arc<dyn ClaimStore>,
        pieces: Option<Arc<dyn PieceFinder>>,
        publisher: Arc<Publisher>,
        queue: Arc<dyn JobQueue>,
        queue_wake: Arc<Notify>,
        config: EngineConfig,
    ) -> Self {
        let presign = PresignAuthority::new(identity.clone(), config.public_url.clone());
        Self {
            identity,
            allocations,
            blobs,
            claims,
            presign,
            pieces,
            publisher,
            queue,
            queue_wake,
            config,
        }
    }

    /// The presign authority sharing this engine's identity and base URL.
    pub fn presign(&self) -> &PresignAuthority {
        &self.presign
    }

    /// `blob/allocate`: reserve space for `(space, blob)`.
    ///
    /// The returned `size` is the number of bytes newly reserved; zero when
    /// a live reservation already covers the blob. The returned `address` is
    /// absent when the bytes are already stored (no upload needed).
    pub async fn allocate(
        &self,
        space: &Did,
        blob: &BlobRef,
        cause: Link,
    ) -> Result<BlobAllocateOk, EngineError> {
        if !blob.digest.is_sha2_256() {
            return Err(EngineError::UnsupportedDigest);
        }
        if blob.size > self.config.max_blob_size {
            return Err(EngineError::BlobSizeOutsideOfSupportedRange {
                max: self.config.max_blob_size,
                got: blob.size,
            });
        }

        let now = now_secs();
        let reserved = self
            .allocations
            .list_for_space(&blob.digest, space)
            .await?
            .iter()
            .any(|a| !a.is_expired(now));
        let stored = self.blobs.contains(&blob.digest).await?;

        if reserved {
            // The prior reservation still covers the blob; report zero newly
            // reserved bytes, with a fresh ticket when the upload is still
            // outstanding.
            let address = if stored {
                None
            } else {
                Some(self.presign.sign(
                    &blob.digest,
                    blob.size,
                    self.config.ticket_ttl_secs,
                    now,
                )?)
            };
            return Ok(BlobAllocateOk { size: 0, address });
        }

        self.allocations
            .put(Allocation {
                space: space.clone(),
                digest: blob.digest.clone(),
                size: blob.size,
                expires: now + self.config.allocation_ttl_secs,
                cause,
            })
            .await?;

        // Cross-space dedup: the bytes may already be stored under another
        // space, in which case the new space needs a reservation but no
        // upload.
        let address = if stored {
            None
        } else {
            Some(self.presign.sign(
                &blob.digest,
                blob.size,
                self.config.ticket_ttl_secs,
                now,
            )?)
        };
        Ok(BlobAllocateOk {
            size: blob.size,
            address,
        })
    }

    /// `blob/accept`: finalize a completed upload into a location commitment.
    ///
    /// Returns the result record plus the fork link of the `assert/location`
    /// invocation carrying the commitment. Re-accepting while a prior
    /// commitment is still live returns the same site with no new fork.
    pub async fn accept(
        &self,
        space: &Did,
        blob: &BlobRef,
    ) -> Result<(BlobAcceptOk, Vec<Link>), EngineError> {
        let now = now_secs();

        let reserved = self
            .allocations
            .list_for_space(&blob.digest, space)
            .await?
            .iter()
            .any(|a| !a.is_expired(now));
        if !reserved {
            return Err(EngineError::InvalidCause(format!(
                "no live allocation for {} in {space}",
                blob.digest
            )));
        }
        if !self.blobs.contains(&blob.digest).await? {
            return Err(EngineError::AllocatedMemoryHadNotBeenWrittenTo);
        }

        if let Some((link, _)) = self.claims.find_live(space, &blob.digest, now).await? {
            tracing::debug!(target: "engine", site = %link, "re-accept returned the live commitment");
            return Ok((BlobAcceptOk { site: link, pdp: None }, Vec::new()));
        }

        // Resolve where this node will serve the blob from: the PDP piece
        // URL when a piece is tracked, the node's own blob route otherwise.
        let (location, pdp) = match &self.pieces {
            Some(pieces) => {
                let piece = pieces
                    .find_piece(&blob.digest)
                    .await
                    .map_err(|e| EngineError::Pdp(e.to_string()))?;
                match piece {
                    Some(piece) => {
                        let accept_link = pieces
                            .accept_piece(&blob.digest)
                            .await
                            .map_err(|e| EngineError::Pdp(e.to_string()))?;
                        (piece.url, Some(accept_link))
                    }
                    None => (self.blob_url(blob), None),
                }
            }
            None => (self.blob_url(blob), None),
        };

        let commitment = sign_commitment(
            self.identity.as_ref(),
            CommitmentPayload {
                issuer: self.identity.did().clone(),
                audience: space.clone(),
                content: blob.digest.clone(),
                locations: vec![location],
                expiration: self.config.commitment_ttl_secs.map(|ttl| now + ttl),
            },
        )?;
        let site = link_of(&commitment)?;
        let archive = codec::to_bytes_canonical(&commitment);
        self.claims.put(&site, &commitment, archive).await?;

        let fork = self.assert_location_fork(&commitment, now)?;
        self.spawn_publish(commitment, site);

        tracing::info!(target: "engine", site = %site, space = %space, "blob accepted");
        Ok((BlobAcceptOk { site, pdp }, vec![fork]))
    }

    /// `replica/allocate`: validate the source commitment, reserve space,
    /// enqueue the transfer, and promise its receipt.
    pub async fn replica_allocate(
        &self,
        caveats: &ReplicaAllocateCaveats,
        invocation_link: Link,
    ) -> Result<(ReplicaAllocateOk, Vec<Link>), EngineError> {
        let source = self.validate_source(caveats)?;

        let allocated = self
            .allocate(&caveats.space, &caveats.blob, invocation_link)
            .await?;

        // The transfer is a self-addressed invocation; its link is what the
        // upload service awaits and what the eventual receipt runs against.
        let transfer = sign_invocation(
            self.identity.as_ref(),
            InvocationPayload {
                issuer: self.identity.did().clone(),
                audience: self.identity.did().clone(),
                subject: self.identity.did().clone(),
                ability: REPLICA_TRANSFER.to_string(),
                caveats: codec::to_bytes_canonical(&ReplicaTransferCaveats {
                    space: caveats.space.clone(),
                    blob: caveats.blob.clone(),
                    site: caveats.site.clone(),
                    cause: invocation_link,
                }),
                cause: Some(invocation_link),
                not_before: None,
                expiration: None,
                nonce: now_secs(),
            },
        )?;
        let transfer_link = link_of(&transfer)?;

        self.queue
            .enqueue(ReplicationJob {
                space: caveats.space.clone(),
                digest: caveats.blob.digest.clone(),
                size: caveats.blob.size,
                source,
                sink: allocated.address,
                cause: transfer_link,
            })
            .await?;
        self.queue_wake.notify_waiters();

        tracing::info!(
            target: "engine",
            transfer = %transfer_link,
            space = %caveats.space,
            "replication job enqueued"
        );
        Ok((
            ReplicaAllocateOk {
                size: allocated.size,
                site: Await::out_ok(transfer_link),
            },
            vec![transfer_link],
        ))
    }

    /// Checks the nested source commitment: decodes, verifies the issuer
    /// signature, and requires it to name the replicated digest and at least
    /// one URL.
    fn validate_source(
        &self,
        caveats: &ReplicaAllocateCaveats,
    ) -> Result<ReplicaSource, EngineError> {
        let commitment: LocationCommitment = codec::from_bytes_canonical(&caveats.site)
            .map_err(|e| EngineError::InvalidCause(format!("site commitment: {e}")))?;
        haven_crypto::envelope::verify_commitment(&commitment).map_err(|_| {
            EngineError::InvalidCause(
                "site commitment is not signed by its stated issuer".to_string(),
            )
        })?;
        if commitment.payload.content != caveats.blob.digest {
            return Err(EngineError::InvalidCause(
                "site commitment names a different digest".to_string(),
            ));
        }
        if commitment.payload.locations.is_empty() {
            return Err(EngineError::InvalidCause(
                "site commitment carries no locations".to_string(),
            ));
        }
        Ok(ReplicaSource {
            urls: commitment.payload.locations.clone(),
            issuer: commitment.payload.issuer.clone(),
        })
    }

    fn blob_url(&self, blob: &BlobRef) -> String {
        format!(
            "{}/blob/{}",
            self.config.public_url.trim_end_matches('/'),
            blob.digest
        )
    }

    /// The `assert/location` invocation that carries a fresh commitment as a
    /// fork effect on the accept receipt.
    fn assert_location_fork(
        &self,
        commitment: &LocationCommitment,
        now: u64,
    ) -> Result<Link, EngineError> {
        let assertion = sign_invocation(
            self.identity.as_ref(),
            InvocationPayload {
                issuer: self.identity.did().clone(),
                audience: commitment.payload.audience.clone(),
                subject: self.identity.did().clone(),
                ability: ASSERT_LOCATION.to_string(),
                caveats: codec::to_bytes_canonical(&AssertLocationCaveats {
                    space: commitment.payload.audience.clone(),
                    content: commitment.payload.content.clone(),
                    location: commitment.payload.locations.clone(),
                    range: None,
                }),
                cause: None,
                not_before: None,
                expiration: commitment.payload.expiration,
                nonce: now,
            },
        )?;
        Ok(link_of(&assertion)?)
    }

    /// Publishing is asynchronous: the accept receipt does not wait for the
    /// discovery layer.
    fn spawn_publish(&self, commitment: LocationCommitment, site: Link) {
        let publisher = self.publisher.clone();
        tokio::spawn(async move {
            if let Err(e) = publisher.publish(&commitment, &site).await {
                tracing::warn!(target: "engine", site = %site, error = %e, "publish failed");
            }
        });
    }
}
