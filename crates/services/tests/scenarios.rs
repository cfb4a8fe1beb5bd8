// Path: crates/services/tests/scenarios.rs
//! End-to-end scenarios: allocate → upload → accept → publish, and the
//! replication pipeline on top of it.

mod common;

use bytes::Bytes;
use common::{expect_error, expect_ok, wait_until, Harness};
use haven_api::crypto::NodeSigner;
use haven_api::store::{BlobStore, ClaimStore};
use haven_crypto::envelope::{sign_commitment, verify_commitment, verify_receipt};
use haven_crypto::hash::digest_of;
use haven_crypto::NodeIdentity;
use haven_services::time::now_secs;
use haven_types::capability::{
    BlobAcceptCaveats, BlobAcceptOk, BlobAllocateCaveats, BlobAllocateOk, BlobRef,
    ReplicaAllocateCaveats, ReplicaAllocateOk, BLOB_ACCEPT, BLOB_ALLOCATE, REPLICA_ALLOCATE,
};
use haven_types::claim::{CommitmentPayload, LocationCommitment};
use haven_types::codec;
use haven_types::error::StoreError;
use haven_types::id::{Did, Link};
use haven_types::invocation::{Await, OUT_OK_SELECTOR};

fn alice() -> Did {
    Did::from_ed25519(&[0xA1; 32])
}

fn bob() -> Did {
    Did::from_ed25519(&[0xB0; 32])
}

fn hello_blob() -> (Bytes, BlobRef) {
    let body = Bytes::from_static(b"hello");
    let digest = digest_of(&body).unwrap();
    (
        body,
        BlobRef {
            digest,
            size: 5,
        },
    )
}

fn allocate_caveats(space: &Did, blob: &BlobRef) -> Vec<u8> {
    codec::to_bytes_canonical(&BlobAllocateCaveats {
        space: space.clone(),
        blob: blob.clone(),
        cause: Link([1u8; 32]),
    })
}

fn accept_caveats(space: &Did, blob: &BlobRef) -> Vec<u8> {
    codec::to_bytes_canonical(&BlobAcceptCaveats {
        space: space.clone(),
        blob: blob.clone(),
        put: Await::out_ok(Link([2u8; 32])),
    })
}

/// Runs S1's allocate → PUT → accept for a space and returns the site link.
async fn upload_and_accept(h: &Harness, space: &Did) -> Link {
    let (body, blob) = hello_blob();

    let receipt = h
        .dispatch(BLOB_ALLOCATE, allocate_caveats(space, &blob), Some(Link([1u8; 32])))
        .await;
    let allocated: BlobAllocateOk = expect_ok(&receipt);
    if let Some(address) = &allocated.address {
        let put = h
            .engine
            .presign()
            .verify(&address.url, &address.headers, now_secs())
            .expect("ticket verifies");
        assert_eq!(put.digest, blob.digest);
        assert_eq!(put.size, 5);
        h.blobs.put(&blob.digest, body.clone()).await.unwrap();
    }

    let receipt = h
        .dispatch(BLOB_ACCEPT, accept_caveats(space, &blob), None)
        .await;
    let accepted: BlobAcceptOk = expect_ok(&receipt);
    accepted.site
}

#[tokio::test]
async fn s1_fresh_allocate_and_accept() {
    let h = Harness::new();
    let (body, blob) = hello_blob();

    // Allocate: fresh reservation, upload expected.
    let receipt = h
        .dispatch(
            BLOB_ALLOCATE,
            allocate_caveats(&alice(), &blob),
            Some(Link([1u8; 32])),
        )
        .await;
    assert!(verify_receipt(&receipt).is_ok());
    let allocated: BlobAllocateOk = expect_ok(&receipt);
    assert_eq!(allocated.size, 5);
    let address = allocated.address.expect("upload address");
    assert!(address.expires > now_secs());

    // PUT through the verified ticket.
    let put = h
        .engine
        .presign()
        .verify(&address.url, &address.headers, now_secs())
        .unwrap();
    assert_eq!(put.digest, blob.digest);
    h.blobs.put(&blob.digest, body.clone()).await.unwrap();

    // Accept issues a commitment and a fork effect.
    let receipt = h
        .dispatch(BLOB_ACCEPT, accept_caveats(&alice(), &blob), None)
        .await;
    let accepted: BlobAcceptOk = expect_ok(&receipt);
    assert_eq!(receipt.payload.forks.len(), 1);

    // The archived claim decodes to a commitment for (alice, digest) and is
    // signed by the node.
    let archive = h.claims.get_archive(&accepted.site).await.unwrap();
    let commitment: LocationCommitment = codec::from_bytes_canonical(&archive).unwrap();
    assert_eq!(commitment.payload.audience, alice());
    assert_eq!(commitment.payload.content, blob.digest);
    assert_eq!(commitment.payload.issuer, *h.node.did());
    assert!(verify_commitment(&commitment).is_ok());
    assert!(commitment.payload.locations[0].contains(&blob.digest.to_string()));

    // The blob reads back.
    assert_eq!(h.blobs.get(&blob.digest).await.unwrap(), body);

    // Publishing is async; the chain head lands shortly after.
    wait_until("advertisement chain head", || async {
        haven_api::publish::AdvertChain::head(h.chain.as_ref())
            .await
            .unwrap()
            .is_some()
    })
    .await;
    assert_eq!(h.transport.announces(), vec!["http://announce.example/ads"]);
    assert_eq!(h.indexing.claims().len(), 1);
}

#[tokio::test]
async fn s2_idempotent_reallocate() {
    let h = Harness::new();
    upload_and_accept(&h, &alice()).await;

    let (_, blob) = hello_blob();
    let receipt = h
        .dispatch(
            BLOB_ALLOCATE,
            allocate_caveats(&alice(), &blob),
            Some(Link([1u8; 32])),
        )
        .await;
    let reallocated: BlobAllocateOk = expect_ok(&receipt);
    assert_eq!(reallocated.size, 0);
    assert!(reallocated.address.is_none());
}

#[tokio::test]
async fn s3_wrong_body_is_rejected() {
    let h = Harness::new();
    let (_, blob) = hello_blob();

    let receipt = h
        .dispatch(
            BLOB_ALLOCATE,
            allocate_caveats(&alice(), &blob),
            Some(Link([1u8; 32])),
        )
        .await;
    let allocated: BlobAllocateOk = expect_ok(&receipt);
    assert!(allocated.address.is_some());

    let err = h
        .blobs
        .put(&blob.digest, Bytes::from_static(b"world"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DataInconsistent { .. }));
    assert!(matches!(
        h.blobs.get(&blob.digest).await,
        Err(StoreError::NotFound)
    ));
}

#[tokio::test]
async fn s4_cross_space_dedup() {
    let h = Harness::new();
    let alice_site = upload_and_accept(&h, &alice()).await;

    let (_, blob) = hello_blob();
    let receipt = h
        .dispatch(
            BLOB_ALLOCATE,
            allocate_caveats(&bob(), &blob),
            Some(Link([1u8; 32])),
        )
        .await;
    let allocated: BlobAllocateOk = expect_ok(&receipt);
    assert_eq!(allocated.size, 5);
    assert!(allocated.address.is_none(), "bytes are already stored");

    let receipt = h
        .dispatch(BLOB_ACCEPT, accept_caveats(&bob(), &blob), None)
        .await;
    let accepted: BlobAcceptOk = expect_ok(&receipt);
    assert_ne!(accepted.site, alice_site);

    let commitment = h.claims.get(&accepted.site).await.unwrap();
    assert_eq!(commitment.payload.audience, bob());
}

#[tokio::test]
async fn reaccept_returns_the_live_commitment() {
    let h = Harness::new();
    let site = upload_and_accept(&h, &alice()).await;

    let (_, blob) = hello_blob();
    let receipt = h
        .dispatch(BLOB_ACCEPT, accept_caveats(&alice(), &blob), None)
        .await;
    let accepted: BlobAcceptOk = expect_ok(&receipt);
    assert_eq!(accepted.site, site);
    assert!(receipt.payload.forks.is_empty());
}

#[tokio::test]
async fn accept_before_upload_fails() {
    let h = Harness::new();
    let (_, blob) = hello_blob();

    h.dispatch(
        BLOB_ALLOCATE,
        allocate_caveats(&alice(), &blob),
        Some(Link([1u8; 32])),
    )
    .await;

    let receipt = h
        .dispatch(BLOB_ACCEPT, accept_caveats(&alice(), &blob), None)
        .await;
    let failure = expect_error(&receipt);
    assert_eq!(failure.code, "ALLOCATED_MEMORY_HAD_NOT_BEEN_WRITTEN_TO");
}

#[tokio::test]
async fn oversized_allocation_is_rejected() {
    let h = Harness::new();
    let (_, mut blob) = hello_blob();
    blob.size = haven_types::DEFAULT_MAX_BLOB_SIZE + 1;

    let receipt = h
        .dispatch(
            BLOB_ALLOCATE,
            allocate_caveats(&alice(), &blob),
            Some(Link([1u8; 32])),
        )
        .await;
    let failure = expect_error(&receipt);
    assert_eq!(failure.code, "BLOB_SIZE_OUTSIDE_OF_SUPPORTED_RANGE");
}

/// Builds the nested source commitment a primary ships with
/// `replica/allocate`.
fn source_commitment(
    primary: &NodeIdentity,
    space: &Did,
    blob: &BlobRef,
    url: &str,
) -> LocationCommitment {
    sign_commitment(
        primary,
        CommitmentPayload {
            issuer: primary.did().clone(),
            audience: space.clone(),
            content: blob.digest.clone(),
            locations: vec![url.to_string()],
            expiration: None,
        },
    )
    .unwrap()
}

fn replica_caveats(space: &Did, blob: &BlobRef, commitment: &LocationCommitment) -> Vec<u8> {
    codec::to_bytes_canonical(&ReplicaAllocateCaveats {
        space: space.clone(),
        blob: blob.clone(),
        site: codec::to_bytes_canonical(commitment),
        cause: Link([3u8; 32]),
    })
}

const SOURCE_URL: &str = "http://primary.example/blob/hello";

#[tokio::test]
async fn s5_replica_transfer() {
    let h = Harness::new();
    let primary = NodeIdentity::generate().unwrap();
    let (body, blob) = hello_blob();
    h.transport.serve(SOURCE_URL, body.clone());

    let commitment = source_commitment(&primary, &alice(), &blob, SOURCE_URL);
    let receipt = h
        .dispatch(
            REPLICA_ALLOCATE,
            replica_caveats(&alice(), &blob, &commitment),
            Some(Link([3u8; 32])),
        )
        .await;
    let promised: ReplicaAllocateOk = expect_ok(&receipt);
    assert_eq!(promised.size, 5);
    assert_eq!(promised.site.selector, OUT_OK_SELECTOR);
    let transfer_link = promised.site.link;
    assert_eq!(receipt.payload.forks, vec![transfer_link]);

    let (engine, shutdown) = h.replication(10);
    let handles = engine.start().await.unwrap();

    wait_until("conclude delivery", || async {
        !h.upload.deliveries().is_empty()
    })
    .await;

    assert_eq!(h.blobs.get(&blob.digest).await.unwrap(), body);
    assert_eq!(h.transport.fetches(SOURCE_URL), 1);

    let deliveries = h.upload.deliveries();
    assert_eq!(deliveries.len(), 1);
    let delivered = &deliveries[0];
    assert!(verify_receipt(delivered).is_ok());
    assert_eq!(delivered.payload.ran, transfer_link);
    let out: BlobAcceptOk = expect_ok(delivered);
    assert!(h.claims.get(&out.site).await.is_ok());

    shutdown.send(true).unwrap();
    h.wake.notify_waiters();
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn s6_replica_retry_does_not_refetch() {
    let h = Harness::new();
    let primary = NodeIdentity::generate().unwrap();
    let (body, blob) = hello_blob();
    h.transport.serve(SOURCE_URL, body.clone());
    h.upload.fail_next(1);

    let commitment = source_commitment(&primary, &alice(), &blob, SOURCE_URL);
    h.dispatch(
        REPLICA_ALLOCATE,
        replica_caveats(&alice(), &blob, &commitment),
        Some(Link([3u8; 32])),
    )
    .await;

    let (engine, shutdown) = h.replication(10);
    let handles = engine.start().await.unwrap();

    wait_until("second conclude delivery", || async {
        h.upload.deliveries().len() >= 2
    })
    .await;

    // The retry reused the locally stored bytes.
    assert_eq!(h.transport.fetches(SOURCE_URL), 1);
    let deliveries = h.upload.deliveries();
    assert!(deliveries[deliveries.len() - 1].payload.out.is_ok());

    shutdown.send(true).unwrap();
    h.wake.notify_waiters();
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn s7_exhausted_retries_emit_a_failure_receipt() {
    let h = Harness::new();
    let primary = NodeIdentity::generate().unwrap();
    let (body, blob) = hello_blob();
    h.transport.serve(SOURCE_URL, body.clone());
    h.upload.reject_ok();

    let commitment = source_commitment(&primary, &alice(), &blob, SOURCE_URL);
    let receipt = h
        .dispatch(
            REPLICA_ALLOCATE,
            replica_caveats(&alice(), &blob, &commitment),
            Some(Link([3u8; 32])),
        )
        .await;
    let promised: ReplicaAllocateOk = expect_ok(&receipt);
    let transfer_link = promised.site.link;

    let (engine, shutdown) = h.replication(2);
    let handles = engine.start().await.unwrap();

    // Two rejected ok-deliveries, then the dead-letter failure receipt.
    wait_until("failure receipt delivery", || async {
        h.upload
            .deliveries()
            .iter()
            .any(|r| !r.payload.out.is_ok())
    })
    .await;

    let deliveries = h.upload.deliveries();
    let failure_receipt = deliveries
        .iter()
        .find(|r| !r.payload.out.is_ok())
        .unwrap();
    assert!(verify_receipt(failure_receipt).is_ok());
    assert_eq!(failure_receipt.payload.ran, transfer_link);

    // The dead-lettered job no longer counts toward queue depth.
    wait_until("queue drained", || async {
        haven_api::queue::JobQueue::depth(h.queue.as_ref())
            .await
            .unwrap()
            == 0
    })
    .await;

    shutdown.send(true).unwrap();
    h.wake.notify_waiters();
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn replica_allocate_rejects_a_forged_source_commitment() {
    let h = Harness::new();
    let primary = NodeIdentity::generate().unwrap();
    let (_, blob) = hello_blob();

    let mut commitment = source_commitment(&primary, &alice(), &blob, SOURCE_URL);
    commitment.payload.locations = vec!["http://attacker.example/blob/x".to_string()];

    let receipt = h
        .dispatch(
            REPLICA_ALLOCATE,
            replica_caveats(&alice(), &blob, &commitment),
            Some(Link([3u8; 32])),
        )
        .await;
    let failure = expect_error(&receipt);
    assert_eq!(failure.code, "INVALID_CAUSE");
}

#[tokio::test]
async fn replica_allocate_with_stored_blob_skips_the_transfer() {
    let h = Harness::new();
    let primary = NodeIdentity::generate().unwrap();
    let (_, blob) = hello_blob();
    upload_and_accept(&h, &alice()).await;

    let commitment = source_commitment(&primary, &bob(), &blob, SOURCE_URL);
    h.dispatch(
        REPLICA_ALLOCATE,
        replica_caveats(&bob(), &blob, &commitment),
        Some(Link([3u8; 32])),
    )
    .await;

    let (engine, shutdown) = h.replication(10);
    let handles = engine.start().await.unwrap();

    wait_until("conclude delivery", || async {
        !h.upload.deliveries().is_empty()
    })
    .await;

    // Already present locally: no fetch against the source.
    assert_eq!(h.transport.fetches(SOURCE_URL), 0);
    assert!(h.upload.deliveries()[0].payload.out.is_ok());

    shutdown.send(true).unwrap();
    h.wake.notify_waiters();
    for handle in handles {
        handle.await.unwrap();
    }
}
