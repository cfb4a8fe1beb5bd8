// Path: crates/http-store-gateway/tests/http.rs
//! Router-level tests over the in-memory stores: upload tickets, range
//! reads, claim archives, and envelope dispatch.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use bytes::Bytes;
use haven_api::crypto::NodeSigner;
use haven_api::store::{AllocationStore, BlobStore, ClaimStore};
use haven_crypto::envelope::sign_commitment;
use haven_crypto::hash::{digest_of, link_of};
use haven_crypto::{NodeIdentity, PresignAuthority};
use haven_services::time::now_secs;
use haven_services::CapabilityGate;
use haven_test_utils::{MemAllocationStore, MemBlobStore, MemClaimStore};
use haven_types::allocation::Allocation;
use haven_types::claim::CommitmentPayload;
use haven_types::codec;
use haven_types::id::{Did, Link};
use http_store_gateway::{router, GatewayConfig, GatewayState};
use std::sync::Arc;
use tower::ServiceExt;

const PUBLIC_URL: &str = "http://node.example:3000";

struct Fixture {
    state: Arc<GatewayState>,
    node: Arc<NodeIdentity>,
    blobs: Arc<MemBlobStore>,
    allocations: Arc<MemAllocationStore>,
    claims: Arc<MemClaimStore>,
}

fn fixture() -> Fixture {
    let node = Arc::new(NodeIdentity::generate().unwrap());
    let blobs = Arc::new(MemBlobStore::default());
    let allocations = Arc::new(MemAllocationStore::default());
    let claims = Arc::new(MemClaimStore::default());
    let gate = Arc::new(CapabilityGate::new(node.clone(), Vec::new()));
    let presign = PresignAuthority::new(node.clone(), PUBLIC_URL);

    let state = Arc::new(GatewayState {
        gate,
        blobs: blobs.clone(),
        claims: claims.clone(),
        allocations: allocations.clone(),
        presign,
    });
    Fixture {
        state,
        node,
        blobs,
        allocations,
        claims,
    }
}

fn app(fixture: &Fixture) -> axum::Router {
    router(fixture.state.clone(), &GatewayConfig::default())
}

async fn body_bytes(response: axum::response::Response) -> Bytes {
    to_bytes(response.into_body(), usize::MAX).await.unwrap()
}

async fn reserve(fixture: &Fixture, digest: &haven_types::id::Digest) {
    fixture
        .allocations
        .put(Allocation {
            space: Did::from_ed25519(&[0xA1; 32]),
            digest: digest.clone(),
            size: 5,
            expires: now_secs() + 3600,
            cause: Link([1u8; 32]),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn put_roundtrips_through_a_ticket() {
    let fixture = fixture();
    let digest = digest_of(b"hello").unwrap();
    reserve(&fixture, &digest).await;

    let presign = PresignAuthority::new(fixture.node.clone(), PUBLIC_URL);
    let ticket = presign.sign(&digest, 5, 900, now_secs()).unwrap();
    let path_and_query = ticket.url.strip_prefix(PUBLIC_URL).unwrap().to_string();

    let response = app(&fixture)
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(&path_and_query)
                .header(header::CONTENT_LENGTH, "5")
                .body(Body::from("hello"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        fixture.blobs.get(&digest).await.unwrap(),
        Bytes::from_static(b"hello")
    );

    // GET serves it back with a length.
    let response = app(&fixture)
        .oneshot(
            Request::builder()
                .uri(format!("/blob/{digest}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok()),
        Some("5")
    );
    assert_eq!(body_bytes(response).await, Bytes::from_static(b"hello"));
}

#[tokio::test]
async fn put_with_a_tampered_ticket_is_401() {
    let fixture = fixture();
    let digest = digest_of(b"hello").unwrap();
    reserve(&fixture, &digest).await;

    let presign = PresignAuthority::new(fixture.node.clone(), PUBLIC_URL);
    let ticket = presign.sign(&digest, 5, 900, now_secs()).unwrap();
    let tampered = ticket
        .url
        .strip_prefix(PUBLIC_URL)
        .unwrap()
        .replace("expires=", "expires=9");

    let response = app(&fixture)
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(&tampered)
                .header(header::CONTENT_LENGTH, "5")
                .body(Body::from("hello"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn put_without_a_live_allocation_is_403() {
    let fixture = fixture();
    let digest = digest_of(b"hello").unwrap();

    let presign = PresignAuthority::new(fixture.node.clone(), PUBLIC_URL);
    let ticket = presign.sign(&digest, 5, 900, now_secs()).unwrap();
    let path_and_query = ticket.url.strip_prefix(PUBLIC_URL).unwrap().to_string();

    let response = app(&fixture)
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(&path_and_query)
                .header(header::CONTENT_LENGTH, "5")
                .body(Body::from("hello"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn put_with_mismatched_body_is_409_and_stores_nothing() {
    let fixture = fixture();
    let digest = digest_of(b"hello").unwrap();
    reserve(&fixture, &digest).await;

    let presign = PresignAuthority::new(fixture.node.clone(), PUBLIC_URL);
    let ticket = presign.sign(&digest, 5, 900, now_secs()).unwrap();
    let path_and_query = ticket.url.strip_prefix(PUBLIC_URL).unwrap().to_string();

    let response = app(&fixture)
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(&path_and_query)
                .header(header::CONTENT_LENGTH, "5")
                .body(Body::from("world"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app(&fixture)
        .oneshot(
            Request::builder()
                .uri(format!("/blob/{digest}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn range_reads_return_206_with_content_range() {
    let fixture = fixture();
    let body = Bytes::from_static(b"hello world");
    let digest = digest_of(&body).unwrap();
    fixture.blobs.put(&digest, body).await.unwrap();

    let response = app(&fixture)
        .oneshot(
            Request::builder()
                .uri(format!("/blob/{digest}"))
                .header(header::RANGE, "bytes=6-10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok()),
        Some("bytes 6-10/11")
    );
    assert_eq!(body_bytes(response).await, Bytes::from_static(b"world"));
}

#[tokio::test]
async fn out_of_bounds_range_is_416() {
    let fixture = fixture();
    let body = Bytes::from_static(b"hello");
    let digest = digest_of(&body).unwrap();
    fixture.blobs.put(&digest, body).await.unwrap();

    let response = app(&fixture)
        .oneshot(
            Request::builder()
                .uri(format!("/blob/{digest}"))
                .header(header::RANGE, "bytes=9-12")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok()),
        Some("bytes */5")
    );
}

#[tokio::test]
async fn missing_blob_is_404() {
    let fixture = fixture();
    let digest = digest_of(b"absent").unwrap();
    let response = app(&fixture)
        .oneshot(
            Request::builder()
                .uri(format!("/blob/{digest}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn claim_archives_are_served_byte_for_byte() {
    let fixture = fixture();
    let commitment = sign_commitment(
        fixture.node.as_ref(),
        CommitmentPayload {
            issuer: fixture.node.did().clone(),
            audience: Did::from_ed25519(&[0xA1; 32]),
            content: digest_of(b"hello").unwrap(),
            locations: vec![format!("{PUBLIC_URL}/blob/x")],
            expiration: None,
        },
    )
    .unwrap();
    let link = link_of(&commitment).unwrap();
    let archive = codec::to_bytes_canonical(&commitment);
    fixture
        .claims
        .put(&link, &commitment, archive.clone())
        .await
        .unwrap();

    let response = app(&fixture)
        .oneshot(
            Request::builder()
                .uri(format!("/claim/{link}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, Bytes::from(archive));
}

#[tokio::test]
async fn garbage_envelopes_are_400() {
    let fixture = fixture();
    let response = app(&fixture)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .body(Body::from(vec![0xFF, 0x00, 0x13]))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_abilities_still_get_a_signed_receipt() {
    let fixture = fixture();
    let service = NodeIdentity::generate().unwrap();
    let envelope = haven_test_utils::service_envelope(
        &service,
        fixture.node.did(),
        "blob/vanish",
        vec![],
        None,
        Vec::new(),
    )
    .unwrap();

    let response = app(&fixture)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .body(Body::from(codec::to_bytes_canonical(&envelope)))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let receipt: haven_types::invocation::Receipt =
        codec::from_bytes_canonical(&body_bytes(response).await).unwrap();
    assert!(haven_crypto::envelope::verify_receipt(&receipt).is_ok());
    assert!(!receipt.payload.out.is_ok());
}
