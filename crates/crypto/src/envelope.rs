// Path: crates/crypto/src/envelope.rs
//! Signing and verification of protocol structures.
//!
//! A signature always covers the canonical encoding of the structure's
//! payload, never the signed wrapper, so links (which hash the wrapper) and
//! signatures never depend on each other.

use crate::error::CryptoError;
use crate::sign::eddsa::verify_did_signature;
use haven_api::crypto::NodeSigner;
use haven_types::claim::{CommitmentPayload, LocationCommitment};
use haven_types::codec;
use haven_types::invocation::{
    Delegation, DelegationPayload, Invocation, InvocationPayload, Receipt, ReceiptPayload,
};

/// Signs an invocation payload with the node key.
pub fn sign_invocation(
    signer: &dyn NodeSigner,
    payload: InvocationPayload,
) -> Result<Invocation, CryptoError> {
    let signature = signer.sign(&codec::to_bytes_canonical(&payload))?;
    Ok(Invocation { payload, signature })
}

/// Verifies an invocation's signature against its stated issuer.
pub fn verify_invocation(invocation: &Invocation) -> Result<(), CryptoError> {
    verify_did_signature(
        &invocation.payload.issuer,
        &codec::to_bytes_canonical(&invocation.payload),
        &invocation.signature,
    )
}

/// Signs a delegation payload with the node key.
pub fn sign_delegation(
    signer: &dyn NodeSigner,
    payload: DelegationPayload,
) -> Result<Delegation, CryptoError> {
    let signature = signer.sign(&codec::to_bytes_canonical(&payload))?;
    Ok(Delegation { payload, signature })
}

/// Verifies a delegation's signature against its stated issuer.
pub fn verify_delegation(delegation: &Delegation) -> Result<(), CryptoError> {
    verify_did_signature(
        &delegation.payload.issuer,
        &codec::to_bytes_canonical(&delegation.payload),
        &delegation.signature,
    )
}

/// Signs a receipt payload with the node key.
pub fn sign_receipt(
    signer: &dyn NodeSigner,
    payload: ReceiptPayload,
) -> Result<Receipt, CryptoError> {
    let signature = signer.sign(&codec::to_bytes_canonical(&payload))?;
    Ok(Receipt { payload, signature })
}

/// Verifies a receipt's signature against its stated issuer.
pub fn verify_receipt(receipt: &Receipt) -> Result<(), CryptoError> {
    verify_did_signature(
        &receipt.payload.issuer,
        &codec::to_bytes_canonical(&receipt.payload),
        &receipt.signature,
    )
}

/// Signs a location commitment payload with the node key.
pub fn sign_commitment(
    signer: &dyn NodeSigner,
    payload: CommitmentPayload,
) -> Result<LocationCommitment, CryptoError> {
    let signature = signer.sign(&codec::to_bytes_canonical(&payload))?;
    Ok(LocationCommitment { payload, signature })
}

/// Verifies a commitment's signature against its stated issuer.
pub fn verify_commitment(commitment: &LocationCommitment) -> Result<(), CryptoError> {
    verify_did_signature(
        &commitment.payload.issuer,
        &codec::to_bytes_canonical(&commitment.payload),
        &commitment.signature,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::link_of;
    use crate::identity::NodeIdentity;
    use haven_types::id::{Digest, Link};

    fn payload(identity: &NodeIdentity) -> InvocationPayload {
        InvocationPayload {
            issuer: identity.did().clone(),
            audience: identity.did().clone(),
            subject: identity.did().clone(),
            ability: "blob/allocate".to_string(),
            caveats: vec![1, 2, 3],
            cause: Some(Link([9u8; 32])),
            not_before: None,
            expiration: Some(4_102_444_800),
            nonce: 7,
        }
    }

    #[test]
    fn signed_invocation_verifies_and_links_are_stable() {
        let identity = NodeIdentity::generate().unwrap();
        let invocation = sign_invocation(&identity, payload(&identity)).unwrap();
        assert!(verify_invocation(&invocation).is_ok());

        let link_a = link_of(&invocation).unwrap();
        let link_b = link_of(&invocation).unwrap();
        assert_eq!(link_a, link_b);
    }

    #[test]
    fn tampered_caveats_fail_verification() {
        let identity = NodeIdentity::generate().unwrap();
        let mut invocation = sign_invocation(&identity, payload(&identity)).unwrap();
        invocation.payload.caveats = vec![9, 9, 9];
        assert!(verify_invocation(&invocation).is_err());
    }

    #[test]
    fn commitment_signature_binds_issuer() {
        let node = NodeIdentity::generate().unwrap();
        let stranger = NodeIdentity::generate().unwrap();

        let commitment = sign_commitment(
            &node,
            CommitmentPayload {
                issuer: node.did().clone(),
                audience: stranger.did().clone(),
                content: Digest::sha2_256([5u8; 32]),
                locations: vec!["http://node.example/blob/x".to_string()],
                expiration: None,
            },
        )
        .unwrap();
        assert!(verify_commitment(&commitment).is_ok());

        let mut forged = commitment.clone();
        forged.payload.issuer = stranger.did().clone();
        assert!(verify_commitment(&forged).is_err());
    }
}
