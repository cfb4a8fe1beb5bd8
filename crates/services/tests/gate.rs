// Path: crates/services/tests/gate.rs
//! Capability gate behavior: authentication, delegation chains, routing,
//! and receipt integrity.

mod common;

use common::{expect_error, Harness};
use haven_api::crypto::NodeSigner;
use haven_crypto::envelope::{sign_delegation, sign_invocation, verify_receipt};
use haven_crypto::hash::link_of;
use haven_crypto::NodeIdentity;
use haven_types::capability::{BlobAllocateCaveats, BlobRef, BLOB_ALLOCATE};
use haven_types::codec;
use haven_types::id::{Did, Digest, Link};
use haven_types::invocation::{DelegationPayload, Envelope, InvocationPayload};

fn allocate_caveats() -> Vec<u8> {
    codec::to_bytes_canonical(&BlobAllocateCaveats {
        space: Did::from_ed25519(&[0xA1; 32]),
        blob: BlobRef {
            digest: Digest::sha2_256([0x42; 32]),
            size: 5,
        },
        cause: Link([1u8; 32]),
    })
}

#[tokio::test]
async fn unknown_ability_yields_an_error_receipt() {
    let h = Harness::new();
    let receipt = h.dispatch("blob/vanish", vec![], None).await;
    let failure = expect_error(&receipt);
    assert_eq!(failure.code, "UNKNOWN_ABILITY");
}

#[tokio::test]
async fn stranger_without_proofs_is_unauthorized() {
    let h = Harness::new();
    let stranger = NodeIdentity::generate().unwrap();
    let envelope = haven_test_utils::service_envelope(
        &stranger,
        h.node.did(),
        BLOB_ALLOCATE,
        allocate_caveats(),
        Some(Link([1u8; 32])),
        Vec::new(),
    )
    .unwrap();

    let receipt = h.dispatch_envelope(&envelope).await;
    let failure = expect_error(&receipt);
    assert_eq!(failure.code, "UNAUTHORIZED_CAUSE");
}

#[tokio::test]
async fn delegated_issuer_is_accepted() {
    let h = Harness::new();
    let agent = NodeIdentity::generate().unwrap();

    // The trusted upload service delegates blob/* on the node to the agent.
    let grant = sign_delegation(
        h.service.as_ref(),
        DelegationPayload {
            issuer: h.service.did().clone(),
            audience: agent.did().clone(),
            subject: h.node.did().clone(),
            ability: "blob/*".to_string(),
            not_before: None,
            expiration: None,
        },
    )
    .unwrap();

    let envelope = haven_test_utils::service_envelope(
        &agent,
        h.node.did(),
        BLOB_ALLOCATE,
        allocate_caveats(),
        Some(Link([1u8; 32])),
        vec![grant],
    )
    .unwrap();

    let receipt = h.dispatch_envelope(&envelope).await;
    assert!(receipt.payload.out.is_ok(), "delegated allocate succeeds");
}

#[tokio::test]
async fn expired_delegation_is_unauthorized() {
    let h = Harness::new();
    let agent = NodeIdentity::generate().unwrap();

    let grant = sign_delegation(
        h.service.as_ref(),
        DelegationPayload {
            issuer: h.service.did().clone(),
            audience: agent.did().clone(),
            subject: h.node.did().clone(),
            ability: "blob/*".to_string(),
            not_before: None,
            expiration: Some(1),
        },
    )
    .unwrap();

    let envelope = haven_test_utils::service_envelope(
        &agent,
        h.node.did(),
        BLOB_ALLOCATE,
        allocate_caveats(),
        Some(Link([1u8; 32])),
        vec![grant],
    )
    .unwrap();

    let receipt = h.dispatch_envelope(&envelope).await;
    assert_eq!(expect_error(&receipt).code, "UNAUTHORIZED_CAUSE");
}

#[tokio::test]
async fn delegation_for_another_ability_does_not_cover() {
    let h = Harness::new();
    let agent = NodeIdentity::generate().unwrap();

    let grant = sign_delegation(
        h.service.as_ref(),
        DelegationPayload {
            issuer: h.service.did().clone(),
            audience: agent.did().clone(),
            subject: h.node.did().clone(),
            ability: "replica/*".to_string(),
            not_before: None,
            expiration: None,
        },
    )
    .unwrap();

    let envelope = haven_test_utils::service_envelope(
        &agent,
        h.node.did(),
        BLOB_ALLOCATE,
        allocate_caveats(),
        Some(Link([1u8; 32])),
        vec![grant],
    )
    .unwrap();

    let receipt = h.dispatch_envelope(&envelope).await;
    assert_eq!(expect_error(&receipt).code, "UNAUTHORIZED_CAUSE");
}

#[tokio::test]
async fn misaddressed_invocation_is_unsupported() {
    let h = Harness::new();
    let elsewhere = NodeIdentity::generate().unwrap();
    let envelope = haven_test_utils::service_envelope(
        &h.service,
        elsewhere.did(),
        BLOB_ALLOCATE,
        allocate_caveats(),
        Some(Link([1u8; 32])),
        Vec::new(),
    )
    .unwrap();

    let receipt = h.dispatch_envelope(&envelope).await;
    assert_eq!(expect_error(&receipt).code, "UNSUPPORTED_CAPABILITY");
}

#[tokio::test]
async fn service_reserved_ability_enforces_the_subject() {
    let h = Harness::new();
    let elsewhere = NodeIdentity::generate().unwrap();

    // Addressed to this node but invoked on someone else's subject.
    let invocation = sign_invocation(
        h.service.as_ref(),
        InvocationPayload {
            issuer: h.service.did().clone(),
            audience: h.node.did().clone(),
            subject: elsewhere.did().clone(),
            ability: BLOB_ALLOCATE.to_string(),
            caveats: allocate_caveats(),
            cause: Some(Link([1u8; 32])),
            not_before: None,
            expiration: None,
            nonce: 1,
        },
    )
    .unwrap();
    let receipt = h
        .dispatch_envelope(&Envelope {
            invocation,
            proofs: Vec::new(),
        })
        .await;
    assert_eq!(expect_error(&receipt).code, "UNAUTHORIZED_CAUSE");
}

#[tokio::test]
async fn missing_cause_is_reported() {
    let h = Harness::new();
    let receipt = h.dispatch(BLOB_ALLOCATE, allocate_caveats(), None).await;
    assert_eq!(expect_error(&receipt).code, "MISSING_CAUSE");
}

#[tokio::test]
async fn tampered_signature_is_unauthorized() {
    let h = Harness::new();
    let mut envelope = haven_test_utils::service_envelope(
        &h.service,
        h.node.did(),
        BLOB_ALLOCATE,
        allocate_caveats(),
        Some(Link([1u8; 32])),
        Vec::new(),
    )
    .unwrap();
    envelope.invocation.signature[0] ^= 0x01;

    let receipt = h.dispatch_envelope(&envelope).await;
    assert_eq!(expect_error(&receipt).code, "UNAUTHORIZED_CAUSE");
}

#[tokio::test]
async fn receipts_are_signed_and_run_against_the_invocation() {
    let h = Harness::new();
    let envelope = haven_test_utils::service_envelope(
        &h.service,
        h.node.did(),
        "blob/vanish",
        vec![],
        None,
        Vec::new(),
    )
    .unwrap();

    let receipt = h.dispatch_envelope(&envelope).await;
    assert!(verify_receipt(&receipt).is_ok());
    assert_eq!(receipt.payload.issuer, *h.node.did());
    assert_eq!(receipt.payload.ran, link_of(&envelope.invocation).unwrap());
}

#[tokio::test]
async fn malformed_envelopes_fail_without_a_receipt() {
    let h = Harness::new();
    let err = h.gate.dispatch(&[0xFF, 0x00, 0x13]).await.unwrap_err();
    assert!(matches!(
        err,
        haven_types::error::GateError::MalformedEnvelope(_)
    ));
}

#[tokio::test]
async fn dispatch_roundtrips_canonical_bytes() {
    let h = Harness::new();
    let envelope = haven_test_utils::service_envelope(
        &h.service,
        h.node.did(),
        "blob/vanish",
        vec![],
        None,
        Vec::new(),
    )
    .unwrap();

    let receipt_bytes = h
        .gate
        .dispatch(&codec::to_bytes_canonical(&envelope))
        .await
        .unwrap();
    let receipt: haven_types::invocation::Receipt =
        codec::from_bytes_canonical(&receipt_bytes).unwrap();
    assert!(verify_receipt(&receipt).is_ok());
}
